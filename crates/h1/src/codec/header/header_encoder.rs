//! HTTP head encoder for serializing start lines and headers
//!
//! Headers are written in their original order and casing, always as `name: value`:
//! whitespace around a received value is not kept. Nothing is added, framing headers
//! are the caller's business.

use std::io;
use std::io::Write;

use bytes::{BufMut, BytesMut};
use http::Version;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{Headers, HttpMessage, SendError, StartLine};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for message heads implementing the [`Encoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadEncoder;

impl<'a, M: HttpMessage> Encoder<&'a M> for HeadEncoder {
    type Error = SendError;

    /// Encodes the start line, the headers and the empty line ending the head.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP version is neither 1.0 nor 1.1.
    fn encode(&mut self, item: &'a M, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(INIT_HEADER_SIZE);

        match item.start_line() {
            StartLine::Request { method, target, version } => {
                let version = version_str(version)?;
                dst.put_slice(method.as_str().as_bytes());
                dst.put_slice(b" ");
                dst.put_slice(target);
                dst.put_slice(b" ");
                dst.put_slice(version.as_bytes());
                dst.put_slice(b"\r\n");
            }
            StartLine::Response { version, status, reason } => {
                write!(FastWrite(dst), "{} {} ", version_str(version)?, status.as_str())?;
                dst.put_slice(reason);
                dst.put_slice(b"\r\n");
            }
        }

        write_header_lines(item.headers(), dst);
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writes `name: value` lines for every header, without the closing empty line.
pub(crate) fn write_header_lines(headers: &Headers, dst: &mut BytesMut) {
    for header in headers {
        dst.put_slice(header.name());
        dst.put_slice(b": ");
        dst.put_slice(header.value());
        dst.put_slice(b"\r\n");
    }
}

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_10 => Ok("HTTP/1.0"),
        Version::HTTP_11 => Ok("HTTP/1.1"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(SendError::invalid_message(format!("unsupported http version {v:?}")))
        }
    }
}

/// Fast writer implementation for writing to BytesMut.
///
/// This is an optimization to avoid unnecessary bounds checking when writing
/// to the bytes buffer, since we've already reserved enough space.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
