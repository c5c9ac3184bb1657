use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{StatusCode, Version};

use crate::protocol::{Body, Headers, HttpMessage, StartLine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    version: Version,
    status: StatusCode,
    reason: Bytes,
    headers: Headers,
    body: Body,
    trailers: Headers,
}

impl Response {
    /// Creates an HTTP/1.1 response with the canonical reason phrase for `status`.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::HTTP_11,
            status,
            reason: Bytes::from_static(status.canonical_reason().unwrap_or("").as_bytes()),
            headers: Headers::new(),
            body: Body::Empty,
            trailers: Headers::new(),
        }
    }

    pub(crate) fn from_head(version: Version, status: StatusCode, reason: Bytes, headers: Headers) -> Self {
        Self { version, status, reason, headers, body: Body::Empty, trailers: Headers::new() }
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<Bytes>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body as is. Framing headers are left to the caller.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Sets a fixed body and the matching `Content-Length` header.
    #[must_use]
    pub fn with_fixed_body(mut self, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        self.headers.remove_all(&CONTENT_LENGTH);
        self.headers.append("Content-Length", data.len().to_string());
        self.body = Body::Fixed(data);
        self
    }

    /// Sets a chunked body and the `Transfer-Encoding: chunked` header.
    #[must_use]
    pub fn with_chunked_body<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.headers.remove_all(&TRANSFER_ENCODING);
        self.headers.append("Transfer-Encoding", "chunked");
        self.body = Body::Chunked(chunks.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_trailer(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.trailers.append(name, value);
        self
    }

    pub(crate) fn attach(&mut self, body: Body, trailers: Headers) {
        self.body = body;
        self.trailers = trailers;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &Bytes {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub fn into_body(self) -> Body {
        self.body
    }
}

impl HttpMessage for Response {
    fn start_line(&self) -> StartLine<'_> {
        StartLine::Response { version: self.version, status: self.status, reason: &self.reason }
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn body(&self) -> &Body {
        &self.body
    }

    fn trailers(&self) -> &Headers {
        &self.trailers
    }
}
