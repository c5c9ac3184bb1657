//! Byte stream transports that connections run over.
//!
//! A connection needs an ordered, bidirectional byte stream and nothing else: any
//! [`AsyncRead`] + [`AsyncWrite`] type qualifies through the [`Io`] blanket trait. The client
//! side obtains streams through a [`Connect`] implementation, [`TcpConnector`] by default.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use http::Uri;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// A stream a connection can own.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Io for T {}

pub type BoxedIo = Box<dyn Io>;

/// An established stream and what is known about its peer.
pub struct Connected {
    pub io: BoxedIo,
    pub remote_addr: Option<SocketAddr>,
    pub secure: bool,
}

impl Connected {
    pub fn new<I: Io>(io: I) -> Self {
        Self { io: Box::new(io), remote_addr: None, secure: false }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

impl fmt::Debug for Connected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connected").field("remote_addr", &self.remote_addr).field("secure", &self.secure).finish_non_exhaustive()
    }
}

/// Where a pool connects to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Destination {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        Self { host: host.into(), port, secure: false }
    }

    /// Takes host, port and scheme from an absolute uri, defaulting the port to 80 or 443.
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        let secure = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            _ => return None,
        };
        let host = uri.host()?;
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        Some(Self { host: host.trim_start_matches('[').trim_end_matches(']').to_owned(), port, secure })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.secure { "https" } else { "http" };
        if self.host.contains(':') {
            write!(f, "{scheme}://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{scheme}://{}:{}", self.host, self.port)
        }
    }
}

/// Opens streams to a destination.
#[trait_variant::make(Connect: Send)]
pub trait LocalConnect {
    async fn connect(&self, destination: &Destination) -> io::Result<Connected>;
}

/// Plain TCP. Secure destinations are refused: TLS belongs in a custom [`Connect`].
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    /// Sets `TCP_NODELAY` on new streams (default: `true`)
    pub nodelay: bool,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl Connect for TcpConnector {
    async fn connect(&self, destination: &Destination) -> io::Result<Connected> {
        if destination.secure {
            return Err(io::Error::new(io::ErrorKind::Unsupported, format!("{destination} needs a tls connector")));
        }

        let stream = TcpStream::connect((destination.host.as_str(), destination.port)).await?;
        stream.set_nodelay(self.nodelay)?;
        let remote_addr = stream.peer_addr()?;
        debug!(%destination, %remote_addr, "tcp connected");

        Ok(Connected::new(stream).with_remote_addr(remote_addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_from_uri() {
        let uri: Uri = "https://example.com/path".parse().unwrap();
        assert_eq!(Destination::from_uri(&uri), Some(Destination { host: "example.com".into(), port: 443, secure: true }));

        let uri: Uri = "http://[::1]:8080/".parse().unwrap();
        let destination = Destination::from_uri(&uri).unwrap();
        assert_eq!(destination, Destination::new("::1", 8080));
        assert_eq!(destination.to_string(), "http://[::1]:8080");

        let uri: Uri = "/relative".parse().unwrap();
        assert_eq!(Destination::from_uri(&uri), None);
    }

    #[tokio::test]
    async fn tcp_connector_refuses_secure_destinations() {
        let destination = Destination { secure: true, ..Destination::new("localhost", 443) };
        let e = Connect::connect(&TcpConnector::new(), &destination).await.err().unwrap();
        assert_eq!(e.kind(), io::ErrorKind::Unsupported);
    }
}
