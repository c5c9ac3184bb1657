use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info};

use crate::connection::{ConnectionConfig, HttpConnection};
use crate::transport::Connected;

/// Accepts TCP connections for the server role.
#[derive(Debug)]
pub struct ConnectionAcceptor {
    listener: TcpListener,
    config: ConnectionConfig,
}

impl ConnectionAcceptor {
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: ConnectionConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(local_addr = ?listener.local_addr().ok(), "start listening");
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn accept(&self) -> io::Result<HttpConnection> {
        let (stream, remote_addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        debug!(%remote_addr, "accepted");
        Ok(HttpConnection::new(Connected::new(stream).with_remote_addr(remote_addr), self.config.clone()))
    }
}
