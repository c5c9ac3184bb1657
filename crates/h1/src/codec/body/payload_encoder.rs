use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::protocol::{Body, Headers, SendError};

/// Encodes a body in the representation it currently holds.
///
/// Fixed bytes are written verbatim, relying on whatever Content-Length the headers
/// already carry; chunk sequences are re-chunked. Headers are never derived from the body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadEncoder;

impl<'a> Encoder<(&'a Body, &'a Headers)> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (&'a Body, &'a Headers), dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            (Body::Empty, _) => Ok(()),
            (Body::Fixed(bytes), _) => {
                dst.extend_from_slice(bytes);
                Ok(())
            }
            (Body::Chunked(chunks), trailers) => ChunkedEncoder.encode((&chunks[..], trailers), dst),
        }
    }
}
