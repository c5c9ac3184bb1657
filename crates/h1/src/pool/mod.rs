//! Connection pooling for the client role.
//!
//! A [`ConnectionPool`] owns the connections to one [`Destination`](crate::transport::Destination):
//!
//! - Idle connections are reused; stale ones found on the way are terminated
//! - New connections are created while below [`PoolConfig::max_connections`], counting
//!   connects in progress
//! - Callers beyond the limit wait for a slot until the connect deadline
//! - Connections can be loaned out for exclusive use and returned later
//! - A request failing on a reused connection that turned out to be dead is retried on
//!   another one

mod config;
mod connection_pool;
mod events;

pub use config::PoolConfig;
pub use connection_pool::{ConnectionCounts, ConnectionPool};
pub use events::{PoolEvent, PoolObserver};
