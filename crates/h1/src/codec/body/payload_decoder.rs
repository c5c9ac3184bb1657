//! Decoder implementation for HTTP message payloads.
//!
//! This module picks the body framing for a parsed head and delegates to the matching
//! decoder:
//! - Chunked transfer encoding
//! - Content-Length based payloads
//! - Bodies delimited by the connection closing
//! - Messages with no body

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::DecoderOptions;
use crate::codec::body::DecodedBody;
use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::close_decoder::CloseDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::codec::header::DecodeMessage;
use crate::protocol::{Body, ParseError};

/// A unified decoder for HTTP message payloads.
#[derive(Debug)]
pub struct PayloadDecoder {
    /// The specific decoding strategy to use
    kind: Kind,
}

#[derive(Debug)]
enum Kind {
    /// Decode payload with a fixed content length
    Length(LengthDecoder),

    /// Decode payload using chunked transfer encoding
    Chunked(ChunkedDecoder),

    /// Decode payload until the peer closes the connection
    Close(CloseDecoder),

    /// Handle messages with no body
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    /// Picks the body framing for a parsed head.
    ///
    /// In order of precedence: chunked transfer encoding (even alongside Content-Length),
    /// Content-Length, a close-delimited body when `Connection: close` is present and the
    /// message type allows it, and otherwise no body.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidMessage`] if Content-Length is malformed, conflicting or
    /// larger than the body limit.
    pub fn for_message<M: DecodeMessage>(message: &M, options: &DecoderOptions) -> Result<Self, ParseError> {
        if !options.expect_body || !message.may_have_body() {
            return Ok(Self::empty());
        }

        let headers = message.headers();
        let limits = options.limits;
        let content_length = headers.content_length()?;

        // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
        if headers.is_chunked() {
            trace!(?content_length, "chunked body");
            return Ok(Self {
                kind: Kind::Chunked(ChunkedDecoder::new(limits, content_length, options.disconnect_after_chunks)),
            });
        }

        if let Some(length) = content_length {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > limits.max_body_size {
                return Err(ParseError::invalid_message(format!(
                    "content-length {length} exceeds the body limit {}",
                    limits.max_body_size
                )));
            }
            trace!(length, "fixed length body");
            return Ok(Self { kind: Kind::Length(LengthDecoder::new(length)) });
        }

        if message.allows_close_delimited_body(options.allow_close_delimited_requests) && message.is_connection_close() {
            trace!("close delimited body");
            return Ok(Self { kind: Kind::Close(CloseDecoder::new(limits.max_body_size)) });
        }

        Ok(Self::empty())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }
}

impl Decoder for PayloadDecoder {
    type Item = DecodedBody;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode(src),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::Close(decoder) => decoder.decode(src),
            Kind::NoBody => Ok(Some(DecodedBody::new(Body::Empty))),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(decoder) => decoder.decode_eof(src),
            Kind::Chunked(decoder) => decoder.decode_eof(src),
            Kind::Close(decoder) => decoder.decode_eof(src),
            Kind::NoBody => Ok(Some(DecodedBody::new(Body::Empty))),
        }
    }
}
