use crate::connection::{ConnectionEvent, HttpConnection};
use crate::protocol::{HttpError, Request, Response};
use crate::transport::Destination;

/// What a pool reports to its observers.
#[derive(Debug)]
pub enum PoolEvent<'a> {
    ConnectionCreated(&'a HttpConnection),
    ConnectionCreateFailed { destination: &'a Destination, error: &'a HttpError },
    /// An event of one of the pool's connections.
    Connection { connection: &'a HttpConnection, event: &'a ConnectionEvent<'a> },
    /// A [`ConnectionPool::send_request_and_receive_response`](crate::pool::ConnectionPool::send_request_and_receive_response)
    /// exchange completed; the connection's transaction has already ended.
    RequestSentAndResponseReceived { connection: &'a HttpConnection, request: &'a Request, response: &'a Response },
    /// Fired exactly once, after the pool stopped and its last connection terminated.
    Terminated,
}

pub type PoolObserver = dyn Fn(&PoolEvent<'_>) + Send + Sync;
