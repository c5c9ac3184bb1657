//! Size limits applied while reading messages.
//!
//! Limits are resolved in three tiers: values passed with a single receive call win over
//! values configured on the connection, which win over [`SizeLimits::default`].
//!
//! ```
//! use micro_h1::protocol::{LimitOverrides, SizeLimits};
//!
//! let connection = LimitOverrides { max_body_size: Some(1024), ..Default::default() };
//! let call = LimitOverrides { max_chunk_size: Some(64), ..Default::default() };
//!
//! let limits = call.resolve(&connection);
//! assert_eq!(limits.max_body_size, 1024);
//! assert_eq!(limits.max_chunk_size, 64);
//! assert_eq!(limits.max_number_of_headers, SizeLimits::default().max_number_of_headers);
//! ```

/// Concrete limits handed to the decoder. [`SizeLimits::UNBOUNDED`] disables a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeLimits {
    /// Maximum start line length including CRLF (default: `1000`)
    pub max_start_line_size: usize,
    /// Maximum header or trailer line length including CRLF (default: `10_000`)
    pub max_header_line_size: usize,
    /// Maximum number of header lines, and separately of trailer lines (default: `256`)
    pub max_number_of_headers: usize,
    /// Maximum decoded body size (default: `1_000_000_000`)
    pub max_body_size: usize,
    /// Maximum size of a single chunk (default: `10_000_000`)
    pub max_chunk_size: usize,
    /// Maximum number of data chunks in a chunked body (default: `1_000_000`)
    pub max_number_of_chunks: usize,
}

impl SizeLimits {
    pub const UNBOUNDED: usize = usize::MAX;

    /// A chunk size line holds at most 16 hex digits; leading zeros beyond that are refused
    /// so padding cannot be used to stall the reader.
    pub const MAX_CHUNK_SIZE_DIGITS: usize = 16;

    /// Chunk size line length including CRLF.
    pub const MAX_CHUNK_HEADER_SIZE: usize = Self::MAX_CHUNK_SIZE_DIGITS + 2;
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_start_line_size: 1_000,
            max_header_line_size: 10_000,
            max_number_of_headers: 256,
            max_body_size: 1_000_000_000,
            max_chunk_size: 10_000_000,
            max_number_of_chunks: 1_000_000,
        }
    }
}

/// Optional limits; `None` defers to the next tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitOverrides {
    pub max_start_line_size: Option<usize>,
    pub max_header_line_size: Option<usize>,
    pub max_number_of_headers: Option<usize>,
    pub max_body_size: Option<usize>,
    pub max_chunk_size: Option<usize>,
    pub max_number_of_chunks: Option<usize>,
}

impl LimitOverrides {
    /// Field by field, keeps `self` where set and takes `fallback` otherwise.
    #[must_use]
    pub fn or(&self, fallback: &LimitOverrides) -> LimitOverrides {
        LimitOverrides {
            max_start_line_size: self.max_start_line_size.or(fallback.max_start_line_size),
            max_header_line_size: self.max_header_line_size.or(fallback.max_header_line_size),
            max_number_of_headers: self.max_number_of_headers.or(fallback.max_number_of_headers),
            max_body_size: self.max_body_size.or(fallback.max_body_size),
            max_chunk_size: self.max_chunk_size.or(fallback.max_chunk_size),
            max_number_of_chunks: self.max_number_of_chunks.or(fallback.max_number_of_chunks),
        }
    }

    /// Resolves `self`, then `fallback`, then the built-in defaults.
    pub fn resolve(&self, fallback: &LimitOverrides) -> SizeLimits {
        let overrides = self.or(fallback);
        let defaults = SizeLimits::default();
        SizeLimits {
            max_start_line_size: overrides.max_start_line_size.unwrap_or(defaults.max_start_line_size),
            max_header_line_size: overrides.max_header_line_size.unwrap_or(defaults.max_header_line_size),
            max_number_of_headers: overrides.max_number_of_headers.unwrap_or(defaults.max_number_of_headers),
            max_body_size: overrides.max_body_size.unwrap_or(defaults.max_body_size),
            max_chunk_size: overrides.max_chunk_size.unwrap_or(defaults.max_chunk_size),
            max_number_of_chunks: overrides.max_number_of_chunks.unwrap_or(defaults.max_number_of_chunks),
        }
    }
}

/// Per call options for receiving a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveOptions {
    pub limits: LimitOverrides,
    /// Stop reading a chunked body after this many chunks, returning what was read and
    /// dropping the connection. Meant for load and abuse testing. Has to stay below the
    /// resolved `max_number_of_chunks`.
    pub disconnect_after_chunks: Option<usize>,
    /// Let requests carry a body delimited by the client closing the connection.
    pub allow_close_delimited_requests: bool,
}
