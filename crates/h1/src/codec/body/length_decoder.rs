//! Decoder implementation for HTTP messages with Content-Length header.
//!
//! This module provides functionality to decode HTTP messages where the payload size
//! is specified by the Content-Length header, as defined in
//! [RFC 7230 Section 3.3.2](https://tools.ietf.org/html/rfc7230#section-3.3.2).

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::DecodedBody;
use crate::protocol::{Body, ParseError};

/// A decoder for a body of known length.
///
/// The body is handed out in one piece once all of it is buffered, split off the read
/// buffer without copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    /// The number of bytes declared by the Content-Length header
    length: usize,
}

impl LengthDecoder {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Decoder for LengthDecoder {
    type Item = DecodedBody;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < self.length {
            return Ok(None);
        }

        let body = if self.length == 0 { Body::Empty } else { Body::Fixed(src.split_to(self.length).freeze()) };
        Ok(Some(DecodedBody::new(body)))
    }

    /// A stream ending before the declared length is a framing error, never a short body.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(body) => Ok(Some(body)),
            None => Err(ParseError::invalid_message(format!(
                "content-length declared {} bytes but the stream ended after {}",
                self.length,
                src.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);

        let mut length_decoder = LengthDecoder::new(10);
        let decoded = length_decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(decoded.body, Body::Fixed(bytes::Bytes::from_static(b"1012345678")));
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");
    }

    #[test]
    fn waits_for_whole_body() {
        let mut buffer = BytesMut::from(&b"1234"[..]);
        let mut decoder = LengthDecoder::new(6);

        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(b"56");
        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().body.len(), 6);
    }

    #[test]
    fn short_body_at_eof() {
        let mut buffer = BytesMut::from(&b"12345678"[..]);
        let mut decoder = LengthDecoder::new(10);

        assert!(matches!(decoder.decode_eof(&mut buffer), Err(ParseError::InvalidMessage { .. })));
    }
}
