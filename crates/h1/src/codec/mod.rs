//! HTTP codec module for encoding and decoding HTTP/1.x messages
//!
//! The codec is sans-IO: decoders consume bytes from a [`BytesMut`](bytes::BytesMut) and
//! report when they need more, encoders append wire bytes to one. The connection layer
//! owns the buffers and the transport.
//!
//! # Architecture
//!
//! - Decoding:
//!   - [`MessageDecoder`]: decodes one complete request or response at a time
//!   - Head parsing in the `header` module, with start line, header line and header
//!     count limits enforced while bytes arrive
//!   - Body decoding in the `body` module: Content-Length, chunked or close-delimited
//!
//! - Encoding:
//!   - [`MessageEncoder`]: writes a message back out in its own representation
//!
//! # Features
//!
//! - Strict size limits from [`SizeLimits`](crate::protocol::SizeLimits)
//! - Zero-copy header slicing
//! - Chunk boundaries and trailers preserved across a decode/encode round trip
//! - Content-Length accounting for chunked bodies that also declare a length

mod body;
mod header;
mod line;
mod message_decoder;
mod message_encoder;

pub use body::DecodedBody;
pub use header::DecodeMessage;
pub use message_decoder::{Decoded, DecoderOptions, MessageDecoder};
pub use message_encoder::MessageEncoder;
