//! HTTP connection handling module
//!
//! This module turns a byte stream into a connection exchanging whole HTTP/1.1 messages,
//! one transaction at a time.
//!
//! # Components
//!
//! - [`HttpConnection`]: lifecycle of one stream:
//!   - Transactions: at most one exchange in progress
//!   - Graceful [`stop`](HttpConnection::stop) and immediate [`terminate`](HttpConnection::terminate)
//!   - Exactly once termination notification, which can be postponed
//!   - Server loop via [`serve`](HttpConnection::serve)
//! - [`Transaction`]: sends and receives requests and responses:
//!   - Out-of-band data detection before a request is sent
//!   - No body for responses to HEAD
//!   - `Connection: close` handling on both sides
//! - [`ConnectionAcceptor`]: accepts server side TCP connections
//! - [`ConnectionEvent`]: what observers registered with
//!   [`on_event`](HttpConnection::on_event) are told

mod acceptor;
mod config;
mod events;
mod http_connection;
mod transaction;

pub use acceptor::ConnectionAcceptor;
pub use config::ConnectionConfig;
pub use events::{ConnectionEvent, ConnectionObserver};
pub use http_connection::{HttpConnection, PostponedNotification};
pub use transaction::Transaction;
