use bytes::Bytes;

use crate::connection::HttpConnection;
use crate::protocol::{HttpError, Request, Response};

/// What a connection reports to its observers.
#[derive(Debug)]
pub enum ConnectionEvent<'a> {
    TransactionStarted,
    TransactionEnded,

    SendingRequest(&'a Request),
    RequestSent(&'a Request),
    RequestSendFailed { request: &'a Request, error: &'a HttpError },

    ReceivingRequest,
    RequestReceived(&'a Request),
    RequestReceiveFailed(&'a HttpError),

    SendingResponse(&'a Response),
    ResponseSent(&'a Response),
    ResponseSendFailed { response: &'a Response, error: &'a HttpError },

    ReceivingResponse,
    ResponseReceived(&'a Response),
    ResponseReceiveFailed(&'a HttpError),

    /// Bytes the peer sent while no message was expected.
    OutOfBandData(&'a Bytes),

    /// Fired exactly once, after the stream was closed.
    Terminated,
}

pub type ConnectionObserver = dyn Fn(&HttpConnection, &ConnectionEvent<'_>) + Send + Sync;
