//! Decoder for bodies delimited by the sender closing the connection.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::body::DecodedBody;
use crate::protocol::{Body, MessagePart, ParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseDecoder {
    max_body_size: usize,
}

impl CloseDecoder {
    pub fn new(max_body_size: usize) -> Self {
        Self { max_body_size }
    }

    fn check_size(&self, src: &BytesMut) -> Result<(), ParseError> {
        if src.len() > self.max_body_size {
            return Err(ParseError::too_large(
                MessagePart::Body,
                self.max_body_size,
                src.len(),
                Bytes::copy_from_slice(&src[..self.max_body_size]),
            ));
        }
        Ok(())
    }
}

impl Decoder for CloseDecoder {
    type Item = DecodedBody;
    type Error = ParseError;

    /// The body only ends with the stream.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.check_size(src)?;
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.check_size(src)?;
        let body = if src.is_empty() { Body::Empty } else { Body::Fixed(src.split().freeze()) };
        Ok(Some(DecodedBody::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_until_eof() {
        let mut buffer = BytesMut::from(&b"hello"[..]);
        let mut decoder = CloseDecoder::new(10);

        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        buffer.extend_from_slice(b" world");
        assert!(decoder.decode(&mut buffer).is_err());

        let mut buffer = BytesMut::from(&b"hello"[..]);
        let decoded = decoder.decode_eof(&mut buffer).unwrap().unwrap();
        assert_eq!(&decoded.body.data()[..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn over_limit_by_one() {
        let mut buffer = BytesMut::from(&b"12345"[..]);
        let mut decoder = CloseDecoder::new(4);

        match decoder.decode_eof(&mut buffer) {
            Err(ParseError::TooLarge { part, limit, received, .. }) => {
                assert_eq!(part, MessagePart::Body);
                assert_eq!(limit, 4);
                assert_eq!(&received[..], b"1234");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
