use std::fmt;
use std::io;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// The part of a message a size limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePart {
    StartLine,
    HeaderLine,
    ChunkHeader,
    Chunk,
    Body,
    TrailerLine,
}

impl fmt::Display for MessagePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessagePart::StartLine => "start line",
            MessagePart::HeaderLine => "header line",
            MessagePart::ChunkHeader => "chunk header",
            MessagePart::Chunk => "chunk",
            MessagePart::Body => "body",
            MessagePart::TrailerLine => "trailer line",
        };
        f.write_str(name)
    }
}

/// The error type shared by the codec, the connection and the pool.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{part} too large: {size} bytes exceed the limit {limit}")]
    MessageTooLarge { part: MessagePart, limit: usize, size: usize, received: Bytes },

    #[error("invalid message: {reason}{}", .details.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    InvalidMessage { reason: String, details: Option<String> },

    #[error("connection {connection} received {} bytes of out-of-band data", .data.len())]
    OutOfBandData { connection: u64, data: Bytes },

    #[error("max connections reached: {max}")]
    MaxConnectionsReached { max: usize },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: &'static str, after: Duration },

    #[error("connection shut down")]
    Shutdown,

    #[error("connection disconnected")]
    Disconnected,

    #[error("connection already in a transaction")]
    InTransaction,

    #[error("previous request is still waiting for its response")]
    ResponsePending,

    #[error("io error: {source}")]
    Io { source: io::Error },
}

impl HttpError {
    pub fn invalid_message<S: ToString>(reason: S) -> Self {
        Self::InvalidMessage { reason: reason.to_string(), details: None }
    }

    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        Self::Timeout { operation, after }
    }

    /// Classifies an I/O error, mapping the ways a peer can go away to [`HttpError::Disconnected`].
    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        let source = e.into();
        match source.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected => Self::Disconnected,
            _ => Self::Io { source },
        }
    }

    /// Whether the connection the error happened on can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::MaxConnectionsReached { .. } | Self::InTransaction | Self::ResponsePending)
    }

    /// Errors caused by picking a connection the peer had already given up on.
    pub fn is_stale_connection(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Shutdown | Self::OutOfBandData { .. })
    }
}

impl From<ParseError> for HttpError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::TooLarge { part, limit, size, received } => Self::MessageTooLarge { part, limit, size, received },
            ParseError::InvalidMessage { reason, details } => Self::InvalidMessage { reason, details },
            ParseError::Io { source } => Self::io(source),
        }
    }
}

impl From<SendError> for HttpError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::InvalidMessage { reason } => Self::InvalidMessage { reason, details: None },
            SendError::Io { source } => Self::io(source),
        }
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("{part} too large: {size} bytes exceed the limit {limit}")]
    TooLarge { part: MessagePart, limit: usize, size: usize, received: Bytes },

    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String, details: Option<String> },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large(part: MessagePart, limit: usize, size: usize, received: Bytes) -> Self {
        Self::TooLarge { part, limit, size, received }
    }

    pub fn invalid_message<S: ToString>(str: S) -> Self {
        Self::InvalidMessage { reason: str.to_string(), details: None }
    }

    /// Like [`ParseError::invalid_message`], keeping the offending bytes for diagnostics.
    pub fn invalid_bytes<S: ToString>(str: S, bytes: &[u8]) -> Self {
        Self::InvalidMessage { reason: str.to_string(), details: Some(String::from_utf8_lossy(bytes).into_owned()) }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_message<S: ToString>(str: S) -> Self {
        Self::InvalidMessage { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
