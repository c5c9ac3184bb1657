//! HTTP body handling module for reading and writing message payloads
//!
//! # Components
//!
//! ## Decoders
//! - [`ChunkedDecoder`](chunked_decoder::ChunkedDecoder): chunked transfer encoding, with chunk, body and chunk count limits
//! - [`LengthDecoder`](length_decoder::LengthDecoder): fixed-length payloads
//! - [`CloseDecoder`](close_decoder::CloseDecoder): payloads ending with the connection
//! - [`PayloadDecoder`]: picks one of the above for a parsed head
//!
//! ## Encoders
//! - [`ChunkedEncoder`](chunked_encoder::ChunkedEncoder): re-chunks a chunk sequence
//! - [`PayloadEncoder`]: writes a body in whatever representation it holds

mod chunked_decoder;
mod chunked_encoder;
mod close_decoder;
mod length_decoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;

use crate::protocol::{Body, Headers};

/// A fully read body.
#[derive(Debug)]
pub struct DecodedBody {
    pub body: Body,
    pub trailers: Headers,
    /// The body was cut short on purpose and the connection has to be dropped.
    pub disconnect: bool,
}

impl DecodedBody {
    pub fn new(body: Body) -> Self {
        Self { body, trailers: Headers::new(), disconnect: false }
    }
}
