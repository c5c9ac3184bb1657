//! HTTP message head processing module
//!
//! # Components
//!
//! - [`HeadDecoder`]: splits complete heads off a byte buffer, enforcing the line and
//!   header count limits
//! - [`DecodeMessage`]: parses a split head into a [`Request`](crate::protocol::Request) or
//!   [`Response`](crate::protocol::Response)
//! - [`HeadEncoder`]: writes start lines and headers back out unchanged

mod header_decoder;
mod header_encoder;

pub use header_decoder::DecodeMessage;
pub use header_decoder::HeadDecoder;
pub(crate) use header_decoder::parse_trailers;
pub use header_encoder::HeadEncoder;
pub(crate) use header_encoder::write_header_lines;
