use std::fmt;
use std::future::Future;

use futures::FutureExt;
use http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::OwnedMutexGuard;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{Instrument, debug, trace, warn};

use crate::codec::{DecodeMessage, Decoded, DecoderOptions, MessageDecoder, MessageEncoder};
use crate::connection::http_connection::IoState;
use crate::connection::{ConnectionEvent, HttpConnection};
use crate::ensure;
use crate::protocol::{HttpError, HttpMessage, ReceiveOptions, Request, Response};

/// The exclusive right to exchange messages on a connection.
///
/// Created by [`HttpConnection::try_start_transaction`] or
/// [`HttpConnection::start_transaction`]; the transaction ends when it is dropped. A
/// connection that is stopping, was disconnected, or is left with a half finished exchange
/// is terminated at that point.
///
/// Errors that leave the stream in an unknown state terminate the connection before
/// they are returned; see [`HttpError::is_fatal`].
pub struct Transaction {
    connection: HttpConnection,
    io: Option<OwnedMutexGuard<IoState>>,
}

impl Transaction {
    pub(crate) fn new(connection: HttpConnection, io: OwnedMutexGuard<IoState>) -> Self {
        connection.span().in_scope(|| trace!("transaction started"));
        connection.emit(&ConnectionEvent::TransactionStarted);
        Self { connection, io: Some(io) }
    }

    pub fn connection(&self) -> &HttpConnection {
        &self.connection
    }

    fn state(&mut self) -> Result<&mut IoState, HttpError> {
        self.io.as_deref_mut().ok_or(HttpError::Disconnected)
    }

    /// Checks that a request can be sent without reading anything first.
    ///
    /// Bytes already readable from the peer are out-of-band data and, unless
    /// [`allow_out_of_band_data`](crate::connection::ConnectionConfig::allow_out_of_band_data)
    /// is set, terminate the connection. A peer that already closed gives
    /// [`HttpError::Disconnected`], a write side we shut down gives [`HttpError::Shutdown`].
    pub fn ensure_ready_to_send(&mut self) -> Result<(), HttpError> {
        let result = self.check_ready_to_send();
        result.map_err(|e| self.fail(e))
    }

    fn check_ready_to_send(&mut self) -> Result<(), HttpError> {
        let connection = self.connection.clone();
        let config = connection.config();
        let IoState { stream, read_buf, write_shutdown, .. } = self.state()?;

        ensure!(!*write_shutdown, HttpError::Shutdown);
        let stream = stream.as_mut().ok_or(HttpError::Disconnected)?;

        if read_buf.is_empty() {
            read_buf.reserve(config.read_buffer_capacity);
            match stream.read_buf(read_buf).now_or_never() {
                None => return Ok(()),
                Some(Ok(0)) => return Err(HttpError::Disconnected),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(HttpError::io(e)),
            }
        }

        if config.allow_out_of_band_data {
            return Ok(());
        }

        let data = read_buf.split().freeze();
        connection.span().in_scope(|| warn!(size = data.len(), "out-of-band data"));
        connection.emit(&ConnectionEvent::OutOfBandData(&data));
        Err(HttpError::OutOfBandData { connection: connection.id(), data })
    }

    /// Sends a request.
    ///
    /// # Errors
    ///
    /// [`HttpError::ResponsePending`] if the response to the previous request was not
    /// received yet, otherwise see [`Transaction::ensure_ready_to_send`].
    pub async fn send_request(&mut self, request: &Request) -> Result<(), HttpError> {
        let connection = self.connection.clone();
        async {
            ensure!(self.state()?.stream.is_some(), HttpError::Disconnected);
            ensure!(self.state()?.last_sent_request.is_none(), HttpError::ResponsePending);
            self.ensure_ready_to_send()?;

            connection.emit(&ConnectionEvent::SendingRequest(request));
            match self.write(request, true, false).await {
                Ok(()) => {
                    self.state()?.last_sent_request = Some(request.clone());
                    debug!(method = %request.method(), "request sent");
                    connection.emit(&ConnectionEvent::RequestSent(request));
                    Ok(())
                }
                Err(e) => {
                    connection.emit(&ConnectionEvent::RequestSendFailed { request, error: &e });
                    Err(self.fail(e))
                }
            }
        }
        .instrument(connection.span().clone())
        .await
    }

    /// Receives the response to the request sent last.
    ///
    /// The body is not read when that request was a HEAD request. An interim `1xx`
    /// response is returned as is; call again for the final one.
    pub async fn receive_response(&mut self, options: &ReceiveOptions) -> Result<Response, HttpError> {
        let connection = self.connection.clone();
        async {
            let expect_body = self.state()?.last_sent_request.as_ref().is_none_or(Request::expects_response_body);
            let limits = options.limits.resolve(&connection.config().limits);
            let decoder_options = DecoderOptions { expect_body, ..DecoderOptions::new(limits, options) };

            connection.emit(&ConnectionEvent::ReceivingResponse);
            let result = match self.read::<Response>(decoder_options).await {
                Ok(Some(decoded)) => Ok(decoded.message),
                Ok(None) => Err(HttpError::Disconnected),
                Err(e) => Err(e),
            };
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    connection.emit(&ConnectionEvent::ResponseReceiveFailed(&e));
                    return Err(self.fail(e));
                }
            };

            if !is_interim(response.status()) {
                self.state()?.last_sent_request = None;
            }
            if response.is_connection_close() {
                connection.mark_stopping();
            }
            debug!(status = %response.status(), "response received");
            connection.emit(&ConnectionEvent::ResponseReceived(&response));
            Ok(response)
        }
        .instrument(connection.span().clone())
        .await
    }

    pub async fn send_request_and_receive_response(
        &mut self,
        request: &Request,
        options: &ReceiveOptions,
    ) -> Result<Response, HttpError> {
        self.send_request(request).await?;
        self.receive_response(options).await
    }

    /// Receives the next request, or `None` when the client closed the connection cleanly
    /// between requests.
    pub async fn receive_request(&mut self, options: &ReceiveOptions) -> Result<Option<Request>, HttpError> {
        let connection = self.connection.clone();
        async {
            ensure!(self.state()?.stream.is_some(), HttpError::Disconnected);
            ensure!(self.state()?.last_received_request.is_none(), HttpError::ResponsePending);
            let limits = options.limits.resolve(&connection.config().limits);

            connection.emit(&ConnectionEvent::ReceivingRequest);
            match self.read::<Request>(DecoderOptions::new(limits, options)).await {
                Ok(None) => {
                    debug!("client closed the connection");
                    Ok(None)
                }
                Ok(Some(Decoded { message: request, .. })) => {
                    if request.is_connection_close() {
                        connection.mark_stopping();
                    }
                    self.state()?.last_received_request = Some(request.clone());
                    debug!(method = %request.method(), "request received");
                    connection.emit(&ConnectionEvent::RequestReceived(&request));
                    Ok(Some(request))
                }
                Err(e) => {
                    connection.emit(&ConnectionEvent::RequestReceiveFailed(&e));
                    Err(self.fail(e))
                }
            }
        }
        .instrument(connection.span().clone())
        .await
    }

    /// Sends the response to the request received last.
    ///
    /// No body is written for a HEAD request. When either message asks for the
    /// connection to be closed, the write side is shut down after the response and the
    /// connection stops.
    pub async fn send_response(&mut self, response: &Response) -> Result<(), HttpError> {
        let connection = self.connection.clone();
        async {
            let io = self.state()?;
            let request = if is_interim(response.status()) {
                io.last_received_request.clone()
            } else {
                io.last_received_request.take()
            };
            let send_body = request.as_ref().is_none_or(Request::expects_response_body);
            let close = request.as_ref().is_some_and(HttpMessage::is_connection_close);

            connection.emit(&ConnectionEvent::SendingResponse(response));
            match self.write(response, send_body, close).await {
                Ok(()) => {
                    debug!(status = %response.status(), "response sent");
                    connection.emit(&ConnectionEvent::ResponseSent(response));
                    Ok(())
                }
                Err(e) => {
                    connection.emit(&ConnectionEvent::ResponseSendFailed { response, error: &e });
                    Err(self.fail(e))
                }
            }
        }
        .instrument(connection.span().clone())
        .await
    }

    async fn write<M: HttpMessage>(&mut self, message: &M, send_body: bool, close: bool) -> Result<(), HttpError> {
        let connection = self.connection.clone();
        let close = close || message.is_connection_close();

        if let Some(delay) = connection.config().send_delay {
            tokio::time::sleep(delay).await;
        }

        let IoState { stream, write_buf, write_shutdown, .. } = self.state()?;
        ensure!(!*write_shutdown, HttpError::Shutdown);
        let stream = stream.as_mut().ok_or(HttpError::Disconnected)?;

        write_buf.clear();
        let mut encoder = if send_body { MessageEncoder::new() } else { MessageEncoder::head_only() };
        encoder.encode(message, write_buf)?;

        guarded(&connection, "write", async {
            stream.write_all_buf(write_buf).await.map_err(HttpError::io)?;
            stream.flush().await.map_err(HttpError::io)?;
            if close {
                stream.shutdown().await.map_err(HttpError::io)?;
            }
            Ok::<(), HttpError>(())
        })
        .await?;

        if close {
            trace!("write side shut down");
            *write_shutdown = true;
            connection.mark_stopping();
        }
        Ok(())
    }

    /// Reads until `decoder` has a message. Returns `None` for a stream that ended
    /// cleanly before the first byte of a message.
    async fn read<M: DecodeMessage>(&mut self, options: DecoderOptions) -> Result<Option<Decoded<M>>, HttpError> {
        let connection = self.connection.clone();
        let capacity = connection.config().read_buffer_capacity;
        let IoState { stream, read_buf, .. } = self.state()?;
        let mut decoder = MessageDecoder::<M>::new(options);

        let (decoded, eof) = guarded(&connection, "read", async {
            loop {
                if let Some(decoded) = decoder.decode(read_buf)? {
                    return Ok::<_, HttpError>((Some(decoded), false));
                }

                let stream = stream.as_mut().ok_or(HttpError::Disconnected)?;
                read_buf.reserve(capacity);
                if stream.read_buf(read_buf).await.map_err(HttpError::io)? == 0 {
                    trace!(buffered = read_buf.len(), "peer closed the stream");
                    return Ok((decoder.decode_eof(read_buf)?, true));
                }
            }
        })
        .await?;

        if eof || decoded.as_ref().is_some_and(|decoded| decoded.disconnect) {
            *stream = None;
        }
        Ok(decoded)
    }

    /// Terminates the connection for errors leaving the stream unusable, then hands the
    /// error back.
    fn fail(&mut self, e: HttpError) -> HttpError {
        if e.is_fatal() {
            warn!(cause = %e, "terminating connection");
            if let Some(io) = self.io.as_deref_mut() {
                io.stream = None;
            }
            self.connection.terminate();
        }
        e
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let mut close = self.connection.is_stopping();
        if let Some(io) = self.io.as_deref_mut() {
            // an exchange cut short leaves the stream in the middle of a message
            close = close || io.stream.is_none() || io.last_sent_request.is_some() || io.last_received_request.is_some();
            if close {
                io.stream = None;
                self.connection.mark_stopping();
            }
        }

        drop(self.io.take());
        self.connection.span().in_scope(|| trace!("transaction ended"));
        self.connection.emit(&ConnectionEvent::TransactionEnded);

        // a `stop` racing with the release may have seen the lock still held; a transaction
        // started since then closes the connection itself when it ends
        if close || (self.connection.is_stopping() && !self.connection.in_transaction()) {
            self.connection.terminate();
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction").field("connection", &self.connection).finish_non_exhaustive()
    }
}

/// `1xx` responses other than `101 Switching Protocols` precede the final response.
fn is_interim(status: StatusCode) -> bool {
    status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS
}

/// Runs stream I/O bounded by the connection's I/O timeout, aborted by termination.
async fn guarded<T, F>(connection: &HttpConnection, operation: &'static str, io: F) -> Result<T, HttpError>
where
    F: Future<Output = Result<T, HttpError>>,
{
    let bounded = async {
        match connection.config().io_timeout {
            Some(after) => tokio::time::timeout(after, io).await.unwrap_or_else(|_elapsed| Err(HttpError::timeout(operation, after))),
            None => io.await,
        }
    };

    tokio::select! {
        biased;
        () = connection.cancellation().cancelled() => Err(HttpError::Disconnected),
        result = bounded => result,
    }
}
