//! Core HTTP/1.x message types.
//!
//! # Architecture
//!
//! - **Messages** ([`Request`], [`Response`]): start line, ordered headers, a [`Body`] and
//!   the trailers read after a chunked body. Built once with the `with_*` methods and
//!   read-only afterwards.
//!
//! - **Headers** ([`Headers`]): an ordered, case-preserving multi-map with case-insensitive
//!   lookups and the framing checks the codec relies on (`Content-Length`,
//!   `Transfer-Encoding`, `Connection: close`).
//!
//! - **Limits** ([`SizeLimits`], [`LimitOverrides`], [`ReceiveOptions`]): the size policy the
//!   decoder enforces and its three-tier override chain.
//!
//! - **Errors** ([`HttpError`], [`ParseError`], [`SendError`]): one error type shared by
//!   every layer, with the codec's own errors converting into it.

mod message;
pub use message::Body;
pub use message::HttpMessage;
pub use message::StartLine;

mod header;
pub use header::Header;
pub use header::Headers;

mod request;
pub use request::Request;

mod response;
pub use response::Response;

mod limits;
pub use limits::LimitOverrides;
pub use limits::ReceiveOptions;
pub use limits::SizeLimits;

mod error;
pub use error::HttpError;
pub use error::MessagePart;
pub use error::ParseError;
pub use error::SendError;
