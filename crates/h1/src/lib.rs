//! HTTP/1.1 framing, connection transactions and connection pooling
//!
//! This crate reads and writes HTTP/1.1 messages over any async byte stream, runs
//! exchanges on a connection one transaction at a time and keeps a bounded set of
//! reusable connections per destination. It serves both roles: issuing requests to
//! upstream hosts and answering requests from clients.
//!
//! # Features
//!
//! - Fixed-length, chunked and close-delimited bodies
//! - Strict, configurable size limits for every part of a message
//! - Messages kept as received: header order and casing, chunk boundaries and trailers
//! - Out-of-band data and stale connection detection before a request is sent
//! - Connection pool with bounded creation, waiting for free slots, loaned connections
//!   and transparent retry on stale connections
//! - Typed lifecycle and traffic events
//! - Structured logging through `tracing`, one span per connection and pool
//!
//! # Example
//!
//! ```no_run
//! use micro_h1::pool::{ConnectionPool, PoolConfig};
//! use micro_h1::protocol::{ReceiveOptions, Request};
//! use micro_h1::transport::Destination;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = ConnectionPool::new(Destination::new("localhost", 8080), PoolConfig::default());
//!
//!     let request = Request::get("/").with_header("Host", "localhost:8080");
//!     if let Some(response) = pool.send_request_and_receive_response(&request, &ReceiveOptions::default()).await? {
//!         println!("{} {:?}", response.status(), response.body().data());
//!     }
//!
//!     pool.stop();
//!     pool.wait_terminated().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`protocol`]: messages, headers, bodies, size limits and errors
//! - [`codec`]: sans-IO message encoding and decoding
//! - [`transport`]: the byte streams connections run over
//! - [`connection`]: connection lifecycle and transactions
//! - [`pool`]: per-destination connection pooling
//! - [`handler`]: request handlers for the server role
//! - [`event`] and [`sync`]: observer lists and the deadlock-reporting mutex
//!
//! # Core Components
//!
//! ## Connections and transactions
//!
//! An [`connection::HttpConnection`] wraps one stream. Messages are only exchanged on a
//! [`connection::Transaction`], which holds the connection exclusively until dropped.
//! Errors that leave the stream in an unknown state terminate the connection.
//!
//! ## Pooling
//!
//! A [`pool::ConnectionPool`] keeps `managed + loaned + pending <= max_connections` at all
//! times and reports its termination exactly once, after it was stopped and its last
//! connection went away.
//!
//! ## Error Handling
//!
//! All operations return [`protocol::HttpError`]. The codec layers use:
//!
//! - [`protocol::ParseError`]: decoding errors
//! - [`protocol::SendError`]: encoding errors
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No TLS support in the default [`transport::TcpConnector`]
//! - Bodies are read completely before a message is returned

pub mod codec;
pub mod connection;
pub mod event;
pub mod handler;
pub mod pool;
pub mod protocol;
pub mod sync;
pub mod transport;

mod utils;
pub(crate) use utils::ensure;
