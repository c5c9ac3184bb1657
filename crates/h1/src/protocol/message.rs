use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode, Version};

use crate::protocol::Headers;

/// The body of a message, in the representation it was read with or will be sent with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Body {
    /// No body at all.
    #[default]
    Empty,
    /// Bytes framed by Content-Length or by the end of the stream.
    Fixed(Bytes),
    /// Chunked transfer coding; the zero-length terminator is implied.
    Chunked(Vec<Bytes>),
}

impl Body {
    /// Number of body bytes, excluding any chunk framing.
    pub fn len(&self) -> usize {
        match self {
            Body::Empty => 0,
            Body::Fixed(bytes) => bytes.len(),
            Body::Chunked(chunks) => chunks.iter().map(Bytes::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, Body::Chunked(_))
    }

    /// Returns the body bytes, joining chunks together.
    pub fn data(&self) -> Bytes {
        match self {
            Body::Empty => Bytes::new(),
            Body::Fixed(bytes) => bytes.clone(),
            Body::Chunked(chunks) if chunks.len() == 1 => chunks[0].clone(),
            Body::Chunked(chunks) => {
                let mut joined = BytesMut::with_capacity(self.len());
                for chunk in chunks {
                    joined.extend_from_slice(chunk);
                }
                joined.freeze()
            }
        }
    }
}

/// The first line of a message.
#[derive(Debug, Clone, Copy)]
pub enum StartLine<'a> {
    Request { method: &'a Method, target: &'a [u8], version: Version },
    Response { version: Version, status: StatusCode, reason: &'a [u8] },
}

/// What the codec needs to know about a request or a response.
pub trait HttpMessage {
    fn start_line(&self) -> StartLine<'_>;

    fn headers(&self) -> &Headers;

    fn body(&self) -> &Body;

    /// Headers sent after a chunked body.
    fn trailers(&self) -> &Headers;

    fn version(&self) -> Version {
        match self.start_line() {
            StartLine::Request { version, .. } | StartLine::Response { version, .. } => version,
        }
    }

    /// Whether the sender asks for the connection to be closed after this message.
    fn is_connection_close(&self) -> bool {
        self.headers().has_connection_close()
    }
}
