use std::time::Duration;

use crate::connection::ConnectionConfig;

/// Settings of a [`ConnectionPool`](super::ConnectionPool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on managed, loaned and connecting connections together (default: `10`)
    pub max_connections: usize,
    /// Deadline for getting a connection, covering both waiting for a free slot and
    /// connecting (default: 10 s)
    pub connect_timeout: Duration,
    /// Settings for every connection the pool creates
    pub connection: ConnectionConfig,
    /// How long the pool lock may be held before it is reported as a bug (default: 1 s)
    pub deadlock_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
            connection: ConnectionConfig::default(),
            deadlock_timeout: Duration::from_secs(1),
        }
    }
}
