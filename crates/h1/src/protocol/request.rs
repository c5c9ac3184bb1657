//! HTTP request representation.
//!
//! A [`Request`] keeps the request target and headers as raw bytes so that a parsed
//! request serializes back to exactly what was received.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, Version};

use crate::protocol::{Body, Headers, HttpMessage, StartLine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    target: Bytes,
    version: Version,
    headers: Headers,
    body: Body,
    trailers: Headers,
}

impl Request {
    /// Creates an HTTP/1.1 request without headers or body.
    pub fn new(method: Method, target: impl Into<Bytes>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: Body::Empty,
            trailers: Headers::new(),
        }
    }

    pub fn get(target: impl Into<Bytes>) -> Self {
        Self::new(Method::GET, target)
    }

    pub(crate) fn from_head(method: Method, target: Bytes, version: Version, headers: Headers) -> Self {
        Self { method, target, version, headers, body: Body::Empty, trailers: Headers::new() }
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
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

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &Bytes {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
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

    /// Whether a response to this request may carry a body.
    ///
    /// Responses to HEAD never do, whatever their framing headers say.
    pub fn expects_response_body(&self) -> bool {
        self.method != Method::HEAD
    }
}

impl HttpMessage for Request {
    fn start_line(&self) -> StartLine<'_> {
        StartLine::Request { method: &self.method, target: &self.target, version: self.version }
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
