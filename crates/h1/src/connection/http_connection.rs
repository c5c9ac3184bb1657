use std::fmt;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use http::StatusCode;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionObserver, Transaction};
use crate::event::Observers;
use crate::handler::Handler;
use crate::protocol::{HttpError, ReceiveOptions, Request, Response};
use crate::transport::{BoxedIo, Connected, Io};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A single HTTP/1.1 connection over a byte stream.
///
/// The connection itself only tracks lifecycle: messages are exchanged on a
/// [`Transaction`], of which there is at most one at a time. Cloning is cheap and every
/// clone refers to the same connection.
///
/// # Lifecycle
///
/// - idle: no transaction, can start one
/// - in transaction: a [`Transaction`] guard is alive
/// - stopping: no new transactions; closed as soon as the current one ends
/// - terminated: the stream is closed and [`ConnectionEvent::Terminated`] was fired
#[derive(Clone)]
pub struct HttpConnection {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    remote_addr: Option<SocketAddr>,
    secure: bool,
    config: ConnectionConfig,
    io: Arc<AsyncMutex<IoState>>,
    stopping: AtomicBool,
    terminated: AtomicBool,
    /// Cancelled on termination, aborting in-flight I/O and waking `wait_terminated`.
    cancel: CancellationToken,
    notification: Mutex<TerminatedNotification>,
    observers: Observers<ConnectionObserver>,
    span: Span,
}

/// Everything owned by the current transaction.
pub(crate) struct IoState {
    pub(crate) stream: Option<BoxedIo>,
    pub(crate) read_buf: BytesMut,
    pub(crate) write_buf: BytesMut,
    /// Sent on this connection, response not fully received yet.
    pub(crate) last_sent_request: Option<Request>,
    /// Received on this connection, not answered yet.
    pub(crate) last_received_request: Option<Request>,
    pub(crate) write_shutdown: bool,
}

#[derive(Debug, Default)]
struct TerminatedNotification {
    postponed: usize,
    pending: bool,
}

impl HttpConnection {
    pub fn new(connected: Connected, config: ConnectionConfig) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("connection", id, remote_addr = ?connected.remote_addr);
        span.in_scope(|| debug!(secure = connected.secure, "connection created"));

        let io = IoState {
            stream: Some(connected.io),
            read_buf: BytesMut::with_capacity(config.read_buffer_capacity),
            write_buf: BytesMut::new(),
            last_sent_request: None,
            last_received_request: None,
            write_shutdown: false,
        };

        Self {
            inner: Arc::new(Inner {
                id,
                remote_addr: connected.remote_addr,
                secure: connected.secure,
                config,
                io: Arc::new(AsyncMutex::new(io)),
                stopping: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                notification: Mutex::new(TerminatedNotification::default()),
                observers: Observers::new(),
                span,
            }),
        }
    }

    /// Wraps a stream with no known peer address, such as one half of a `tokio::io::duplex`.
    pub fn from_io<I: Io>(io: I, config: ConnectionConfig) -> Self {
        Self::new(Connected::new(io), config)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn is_secure(&self) -> bool {
        self.inner.secure
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub(crate) fn span(&self) -> &Span {
        &self.inner.span
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.io.try_lock().is_err()
    }

    pub fn on_event(&self, observer: Arc<ConnectionObserver>) {
        self.inner.observers.add(observer);
    }

    pub(crate) fn emit(&self, event: &ConnectionEvent<'_>) {
        for observer in self.inner.observers.snapshot() {
            observer(self, event);
        }
    }

    /// Starts a transaction if the connection is free right now.
    ///
    /// # Errors
    ///
    /// [`HttpError::InTransaction`] when busy, [`HttpError::Shutdown`] when stopping and
    /// [`HttpError::Disconnected`] when terminated.
    pub fn try_start_transaction(&self) -> Result<Transaction, HttpError> {
        self.ensure_usable()?;
        let Ok(guard) = Arc::clone(&self.inner.io).try_lock_owned() else {
            return Err(HttpError::InTransaction);
        };
        // terminated while we were taking the lock
        self.ensure_usable()?;
        Ok(Transaction::new(self.clone(), guard))
    }

    /// Waits until the connection is free and starts a transaction.
    ///
    /// Waits `timeout`, or [`ConnectionConfig::transaction_timeout`] when `None`. Timing out
    /// leaves the connection alone.
    pub async fn start_transaction(&self, timeout: Option<Duration>) -> Result<Transaction, HttpError> {
        self.ensure_usable()?;
        let timeout = timeout.unwrap_or(self.inner.config.transaction_timeout);

        let lock = tokio::time::timeout(timeout, Arc::clone(&self.inner.io).lock_owned());
        let guard = tokio::select! {
            () = self.inner.cancel.cancelled() => return Err(HttpError::Disconnected),
            guard = lock => guard.map_err(|_elapsed| HttpError::timeout("start transaction", timeout))?,
        };

        self.ensure_usable()?;
        Ok(Transaction::new(self.clone(), guard))
    }

    fn ensure_usable(&self) -> Result<(), HttpError> {
        if self.is_terminated() {
            Err(HttpError::Disconnected)
        } else if self.is_stopping() {
            Err(HttpError::Shutdown)
        } else {
            Ok(())
        }
    }

    pub(crate) fn mark_stopping(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
    }

    /// Lets the current transaction finish, then closes the connection.
    pub fn stop(&self) {
        self.mark_stopping();
        if self.is_terminated() {
            return;
        }
        self.inner.span.in_scope(|| debug!("stopping"));
        // a transaction ending after `stopping` was set terminates the connection itself
        if !self.in_transaction() {
            self.terminate();
        }
    }

    /// Closes the connection now, aborting any I/O in progress.
    pub fn terminate(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);
        if self.inner.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.cancel.cancel();
        // a transaction in progress drops the stream itself once its I/O is aborted
        if let Ok(mut io) = self.inner.io.try_lock() {
            io.stream = None;
        }
        self.inner.span.in_scope(|| info!("connection terminated"));

        let deliver = {
            let mut notification = self.notification();
            if notification.postponed > 0 {
                notification.pending = true;
                false
            } else {
                true
            }
        };
        if deliver {
            self.emit(&ConnectionEvent::Terminated);
        }
    }

    /// Holds back the [`ConnectionEvent::Terminated`] notification while the returned guard,
    /// or any other one, is alive. A termination in that window is reported when the last
    /// guard is dropped.
    pub fn postpone_terminated_notification(&self) -> PostponedNotification {
        self.notification().postponed += 1;
        PostponedNotification { connection: self.clone() }
    }

    fn notification(&self) -> std::sync::MutexGuard<'_, TerminatedNotification> {
        self.inner.notification.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn wait_terminated(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Serves requests with `handler` until the client goes away or either side asks
    /// for the connection to be closed.
    ///
    /// A handler error is answered with `500 Internal Server Error`.
    pub async fn serve<H>(&self, handler: &H) -> Result<(), HttpError>
    where
        H: Handler + Sync,
        H::Error: Display,
    {
        let options = ReceiveOptions::default();
        async {
            loop {
                let mut transaction = self.start_transaction(None).await?;
                let Some(request) = transaction.receive_request(&options).await? else {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                };

                let response = match handler.call(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(cause = %e, "handle request error");
                        Response::new(StatusCode::INTERNAL_SERVER_ERROR).with_fixed_body("")
                    }
                };
                transaction.send_response(&response).await?;
                drop(transaction);

                if self.is_stopping() {
                    return Ok(());
                }
            }
        }
        .instrument(self.inner.span.clone())
        .await
    }
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("stopping", &self.is_stopping())
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

impl PartialEq for HttpConnection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for HttpConnection {}

/// See [`HttpConnection::postpone_terminated_notification`].
#[derive(Debug)]
pub struct PostponedNotification {
    connection: HttpConnection,
}

impl Drop for PostponedNotification {
    fn drop(&mut self) {
        let deliver = {
            let mut notification = self.connection.notification();
            notification.postponed -= 1;
            notification.postponed == 0 && std::mem::take(&mut notification.pending)
        };
        if deliver {
            self.connection.emit(&ConnectionEvent::Terminated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn connection() -> HttpConnection {
        let (client, _server) = tokio::io::duplex(64);
        HttpConnection::from_io(client, ConnectionConfig::default())
    }

    fn count_terminations(connection: &HttpConnection) -> Arc<StdMutex<usize>> {
        let count = Arc::new(StdMutex::new(0));
        let counter = Arc::clone(&count);
        connection.on_event(Arc::new(move |_: &HttpConnection, event: &ConnectionEvent<'_>| {
            if matches!(event, ConnectionEvent::Terminated) {
                *counter.lock().unwrap() += 1;
            }
        }));
        count
    }

    #[tokio::test]
    async fn one_transaction_at_a_time() {
        let connection = connection();
        let transaction = connection.try_start_transaction().unwrap();

        assert!(connection.in_transaction());
        assert!(matches!(connection.try_start_transaction(), Err(HttpError::InTransaction)));
        assert!(matches!(
            connection.start_transaction(Some(Duration::from_millis(10))).await,
            Err(HttpError::Timeout { .. })
        ));
        assert!(!connection.is_terminated());

        drop(transaction);
        assert!(!connection.in_transaction());
        assert!(connection.try_start_transaction().is_ok());
    }

    #[tokio::test]
    async fn terminated_fires_once() {
        let connection = connection();
        let count = count_terminations(&connection);

        connection.terminate();
        connection.terminate();
        connection.stop();

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(matches!(connection.try_start_transaction(), Err(HttpError::Disconnected)));
        connection.wait_terminated().await;
    }

    #[tokio::test]
    async fn postponed_notification_is_delivered_by_last_guard() {
        let connection = connection();
        let count = count_terminations(&connection);

        let first = connection.postpone_terminated_notification();
        let second = connection.postpone_terminated_notification();
        connection.terminate();
        assert_eq!(*count.lock().unwrap(), 0);

        drop(first);
        assert_eq!(*count.lock().unwrap(), 0);
        drop(second);
        assert_eq!(*count.lock().unwrap(), 1);

        drop(connection.postpone_terminated_notification());
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn stop_waits_for_the_transaction() {
        let connection = connection();
        let transaction = connection.try_start_transaction().unwrap();

        connection.stop();
        assert!(connection.is_stopping());
        assert!(!connection.is_terminated());
        assert!(matches!(connection.try_start_transaction(), Err(HttpError::Shutdown)));

        drop(transaction);
        assert!(connection.is_terminated());
    }

    #[test]
    fn stop_racing_with_transaction_end_still_terminates() {
        for _ in 0..500 {
            let connection = connection();
            let transaction = connection.try_start_transaction().unwrap();
            let barrier = std::sync::Barrier::new(2);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    drop(transaction);
                });
                barrier.wait();
                connection.stop();
            });

            assert!(connection.is_terminated());
        }
    }
}
