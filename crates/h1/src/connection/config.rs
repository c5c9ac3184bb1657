use std::time::Duration;

use crate::protocol::LimitOverrides;

/// Settings a connection is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Limits used when a receive call does not override them
    pub limits: LimitOverrides,
    /// Bound on every read or write on the stream; `None` waits forever (default: `None`)
    pub io_timeout: Option<Duration>,
    /// How long [`start_transaction`](super::HttpConnection::start_transaction) waits for
    /// the connection to become free (default: 10 s)
    pub transaction_timeout: Duration,
    /// Sleep before every message written, for simulating slow peers (default: `None`)
    pub send_delay: Option<Duration>,
    /// Tolerate bytes arriving before a request was sent (default: `false`)
    pub allow_out_of_band_data: bool,
    /// How much read buffer to reserve before each read (default: 8 KiB)
    pub read_buffer_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            limits: LimitOverrides::default(),
            io_timeout: None,
            transaction_timeout: Duration::from_secs(10),
            send_delay: None,
            allow_out_of_band_data: false,
            read_buffer_capacity: 8 * 1024,
        }
    }
}
