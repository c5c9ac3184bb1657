//! HTTP head decoder for parsing start lines and header blocks
//!
//! The decoder works in two stages:
//!
//! 1. Scan CRLF terminated lines, enforcing the start line and header line limits and the
//!    header count as bytes arrive, until the empty line closing the head is seen
//! 2. Split the head off the buffer and parse it with `httparse`
//!
//! Header names, values, the request target and the reason phrase are sliced out of the
//! split head with [`Bytes::slice_ref`], so no header data is copied.

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Method, StatusCode, Version};
use httparse::Status;
use tracing::trace;

use crate::codec::line::find_line;
use crate::ensure;
use crate::protocol::{Body, Headers, HttpMessage, MessagePart, ParseError, Request, Response, SizeLimits};

/// Splits complete message heads off a buffer.
///
/// The decoder remembers how far it has scanned, so bytes arriving in small pieces are
/// only looked at once.
#[derive(Debug, Default)]
pub struct HeadDecoder {
    scanned: usize,
    lines: usize,
}

impl HeadDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no byte of a head has been scanned yet.
    pub fn is_idle(&self) -> bool {
        self.scanned == 0
    }

    /// Returns the raw head, including the empty line ending it, and the number of header lines.
    ///
    /// # Errors
    ///
    /// - [`ParseError::TooLarge`] when the start line or a header line exceeds its limit
    /// - [`ParseError::InvalidMessage`] when there are more than `max_number_of_headers` headers
    pub fn decode_head(&mut self, src: &mut BytesMut, limits: &SizeLimits) -> Result<Option<(Bytes, usize)>, ParseError> {
        loop {
            let (limit, part) = if self.lines == 0 {
                (limits.max_start_line_size, MessagePart::StartLine)
            } else {
                (limits.max_header_line_size, MessagePart::HeaderLine)
            };

            let Some(len) = find_line(&src[self.scanned..], limit, part)? else {
                return Ok(None);
            };

            if len == 2 {
                ensure!(self.lines > 0, ParseError::invalid_message("empty start line"));

                let head = src.split_to(self.scanned + len).freeze();
                let header_count = self.lines - 1;
                *self = Self::default();

                trace!(head_size = head.len(), header_count, "decoded message head");
                return Ok(Some((head, header_count)));
            }

            self.scanned += len;
            self.lines += 1;

            let header_count = self.lines - 1;
            ensure!(
                header_count <= limits.max_number_of_headers,
                ParseError::invalid_message(format!("more than {} headers", limits.max_number_of_headers))
            );
        }
    }
}

/// A message type the decoder can produce.
pub trait DecodeMessage: HttpMessage + Sized {
    /// Parses a complete head as returned by [`HeadDecoder::decode_head`].
    fn parse_head(head: &Bytes, header_count: usize) -> Result<Self, ParseError>;

    fn attach(&mut self, body: Body, trailers: Headers);

    /// Whether this message may carry a body delimited by the sender closing the connection.
    fn allows_close_delimited_body(&self, allow_close_delimited_requests: bool) -> bool;

    /// Whether this message can carry a body at all, independent of its framing headers.
    fn may_have_body(&self) -> bool {
        true
    }
}

impl DecodeMessage for Request {
    fn parse_head(head: &Bytes, header_count: usize) -> Result<Self, ParseError> {
        let mut headers = vec![httparse::EMPTY_HEADER; header_count];
        let mut req = httparse::Request::new(&mut headers);

        let status = req.parse(head).map_err(|e| ParseError::invalid_bytes(e, first_line(head)))?;
        ensure_complete(status, head)?;

        let method = req.method.ok_or_else(|| ParseError::invalid_message("missing method"))?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|e| ParseError::invalid_bytes(e, first_line(head)))?;
        let target = head.slice_ref(req.path.ok_or_else(|| ParseError::invalid_message("missing request target"))?.as_bytes());
        let version = parse_version(req.version)?;

        Ok(Request::from_head(method, target, version, collect_headers(head, req.headers)))
    }

    fn attach(&mut self, body: Body, trailers: Headers) {
        Request::attach(self, body, trailers);
    }

    fn allows_close_delimited_body(&self, allow_close_delimited_requests: bool) -> bool {
        allow_close_delimited_requests
    }
}

impl DecodeMessage for Response {
    fn parse_head(head: &Bytes, header_count: usize) -> Result<Self, ParseError> {
        let mut headers = vec![httparse::EMPTY_HEADER; header_count];
        let mut res = httparse::Response::new(&mut headers);

        let status = res.parse(head).map_err(|e| ParseError::invalid_bytes(e, first_line(head)))?;
        ensure_complete(status, head)?;

        let version = parse_version(res.version)?;
        let code = res.code.ok_or_else(|| ParseError::invalid_message("missing status code"))?;
        let status = StatusCode::from_u16(code).map_err(|e| ParseError::invalid_bytes(e, first_line(head)))?;
        let reason = head.slice_ref(res.reason.unwrap_or_default().as_bytes());

        Ok(Response::from_head(version, status, reason, collect_headers(head, res.headers)))
    }

    fn attach(&mut self, body: Body, trailers: Headers) {
        Response::attach(self, body, trailers);
    }

    fn allows_close_delimited_body(&self, _allow_close_delimited_requests: bool) -> bool {
        true
    }

    /// Informational, 204 and 304 responses never have a body.
    fn may_have_body(&self) -> bool {
        let status = self.status();
        !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED)
    }
}

/// Parses the trailer block following a chunked body, including its closing empty line.
pub(crate) fn parse_trailers(block: &Bytes, count: usize) -> Result<Headers, ParseError> {
    let mut headers = vec![httparse::EMPTY_HEADER; count];

    let parsed = match httparse::parse_headers(block, &mut headers) {
        Ok(Status::Complete((size, parsed))) if size == block.len() => parsed,
        Ok(_) => return Err(ParseError::invalid_bytes("malformed trailer block", block)),
        Err(e) => return Err(ParseError::invalid_bytes(e, block)),
    };

    let trailers = collect_headers(block, parsed);
    ensure!(
        !trailers.contains(&CONTENT_LENGTH) && !trailers.contains(&TRANSFER_ENCODING),
        ParseError::invalid_message("trailers must not carry content-length or transfer-encoding")
    );
    Ok(trailers)
}

fn ensure_complete(status: Status<usize>, head: &Bytes) -> Result<(), ParseError> {
    match status {
        Status::Complete(size) if size == head.len() => Ok(()),
        // the line scan only splits on CRLF, so this means a bare LF inside the head
        _ => Err(ParseError::invalid_bytes("malformed line terminators in message head", first_line(head))),
    }
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        // Currently HTTP/2 and HTTP/3 not supported
        v => Err(ParseError::invalid_message(format!("unsupported http version: {v:?}"))),
    }
}

fn collect_headers(buf: &Bytes, parsed: &[httparse::Header<'_>]) -> Headers {
    let mut headers = Headers::with_capacity(parsed.len());
    for header in parsed {
        headers.append(buf.slice_ref(header.name.as_bytes()), buf.slice_ref(header.value));
    }
    headers
}

fn first_line(head: &[u8]) -> &[u8] {
    head.split(|b| *b == b'\n').next().unwrap_or(head)
}
