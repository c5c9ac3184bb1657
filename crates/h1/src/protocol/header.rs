//! Ordered, case-preserving HTTP header lists.
//!
//! `http::HeaderMap` normalizes names to lowercase, which loses the casing a peer
//! sent. Messages here are forwarded exactly as they were read, so headers are kept
//! as an ordered list of raw name/value pairs with case-insensitive lookups on top.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::HeaderName;

use crate::protocol::ParseError;

/// A single header line: raw name and value bytes, as read or as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: Bytes,
    value: Bytes,
}

impl Header {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    pub fn name(&self) -> &Bytes {
        &self.name
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn is(&self, name: &HeaderName) -> bool {
        self.name.eq_ignore_ascii_case(name.as_str().as_bytes())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    /// Appends a header, keeping any existing header with the same name.
    pub fn append(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.entries.push(Header::new(name, value));
    }

    /// Returns the first value for `name`.
    pub fn get(&self, name: &HeaderName) -> Option<&Bytes> {
        self.entries.iter().find(|h| h.is(name)).map(Header::value)
    }

    pub fn get_all<'a>(&'a self, name: &'a HeaderName) -> impl Iterator<Item = &'a Bytes> + 'a {
        self.entries.iter().filter(move |h| h.is(name)).map(Header::value)
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.entries.iter().any(|h| h.is(name))
    }

    /// Removes every header named `name`, returning how many were removed.
    pub fn remove_all(&mut self, name: &HeaderName) -> usize {
        let before = self.entries.len();
        self.entries.retain(|h| !h.is(name));
        before - self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses the Content-Length header(s).
    ///
    /// Duplicates are accepted as long as every value is the same; a value that is not a
    /// plain base-10 number is rejected.
    pub fn content_length(&self) -> Result<Option<u64>, ParseError> {
        let mut length = None;
        for value in self.get_all(&CONTENT_LENGTH) {
            let trimmed = value.trim_ascii();
            if trimmed.is_empty() || !trimmed.iter().all(u8::is_ascii_digit) {
                return Err(ParseError::invalid_bytes("malformed content-length", value));
            }

            // all digits, so this only fails on overflow
            let parsed = std::str::from_utf8(trimmed)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| ParseError::invalid_bytes("content-length out of range", value))?;

            match length {
                Some(previous) if previous != parsed => {
                    return Err(ParseError::invalid_message(format!(
                        "conflicting content-length values {previous} and {parsed}"
                    )));
                }
                _ => length = Some(parsed),
            }
        }
        Ok(length)
    }

    /// Whether the final transfer coding is `chunked`.
    ///
    /// According to RFC 7230, chunked must be the last encoding if present.
    pub fn is_chunked(&self) -> bool {
        const CHUNKED: &[u8] = b"chunked";
        self.get_all(&TRANSFER_ENCODING)
            .last()
            .and_then(|value| value.rsplit(|b| *b == b',').next())
            .is_some_and(|coding| coding.trim_ascii().eq_ignore_ascii_case(CHUNKED))
    }

    /// Whether a `Connection` header carries the `close` option.
    pub fn has_connection_close(&self) -> bool {
        self.get_all(&CONNECTION)
            .flat_map(|value| value.split(|b| *b == b','))
            .any(|option| option.trim_ascii().eq_ignore_ascii_case(b"close"))
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<N: Into<Bytes>, V: Into<Bytes>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().map(|(name, value)| Header::new(name, value)).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> Headers {
        pairs.iter().copied().collect()
    }

    #[test]
    fn lookups_ignore_case_and_keep_order() {
        let headers = headers(&[("Host", "a"), ("X-Dup", "1"), ("x-dup", "2")]);

        assert_eq!(headers.get(&http::header::HOST).map(|v| &v[..]), Some(&b"a"[..]));

        let name = HeaderName::from_static("x-dup");
        let values: Vec<_> = headers.get_all(&name).collect();
        assert_eq!(values, vec![&Bytes::from_static(b"1"), &Bytes::from_static(b"2")]);

        let names: Vec<_> = headers.iter().map(|h| h.name().clone()).collect();
        assert_eq!(names, vec!["Host", "X-Dup", "x-dup"]);
    }

    #[test]
    fn check_content_length() {
        assert_eq!(headers(&[]).content_length().unwrap(), None);
        assert_eq!(headers(&[("Content-Length", " 42 ")]).content_length().unwrap(), Some(42));
        assert_eq!(headers(&[("content-length", "7"), ("Content-Length", "7")]).content_length().unwrap(), Some(7));

        assert!(headers(&[("Content-Length", "-1")]).content_length().is_err());
        assert!(headers(&[("Content-Length", "0x10")]).content_length().is_err());
        assert!(headers(&[("Content-Length", "")]).content_length().is_err());
        assert!(headers(&[("Content-Length", "99999999999999999999999")]).content_length().is_err());
        assert!(headers(&[("Content-Length", "1"), ("Content-Length", "2")]).content_length().is_err());
    }

    #[test]
    fn check_is_chunked() {
        assert!(!headers(&[]).is_chunked());
        assert!(headers(&[("Accept", "foo"), ("Transfer-Encoding", "gzip, chunked")]).is_chunked());
        assert!(headers(&[("transfer-encoding", "CHUNKED")]).is_chunked());
        assert!(!headers(&[("Transfer-Encoding", "chunked, gzip")]).is_chunked());
        assert!(!headers(&[("Transfer-Encoding", "gzip")]).is_chunked());
    }

    #[test]
    fn check_connection_close() {
        assert!(headers(&[("Connection", "close")]).has_connection_close());
        assert!(headers(&[("connection", "Upgrade, Close")]).has_connection_close());
        assert!(!headers(&[("Connection", "keep-alive")]).has_connection_close());
        assert!(!headers(&[]).has_connection_close());
    }
}
