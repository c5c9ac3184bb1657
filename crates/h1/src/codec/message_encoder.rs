use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeadEncoder;
use crate::protocol::{HttpMessage, SendError};

/// Encodes complete messages exactly as they are represented.
#[derive(Debug, Clone, Copy)]
pub struct MessageEncoder {
    head_encoder: HeadEncoder,
    payload_encoder: PayloadEncoder,
    send_body: bool,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An encoder writing heads only, as for a response to HEAD.
    pub fn head_only() -> Self {
        Self { send_body: false, ..Self::default() }
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self { head_encoder: HeadEncoder, payload_encoder: PayloadEncoder, send_body: true }
    }
}

impl<'a, M: HttpMessage> Encoder<&'a M> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, item: &'a M, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.head_encoder.encode(item, dst)?;
        if self.send_body {
            self.payload_encoder.encode((item.body(), item.trailers()), dst)?;
        }
        Ok(())
    }
}
