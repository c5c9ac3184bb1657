use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, trace, warn};

use crate::connection::{ConnectionEvent, HttpConnection, Transaction};
use crate::ensure;
use crate::event::Observers;
use crate::pool::{PoolConfig, PoolEvent, PoolObserver};
use crate::protocol::{HttpError, ReceiveOptions, Request, Response};
use crate::sync::DeadlockMutex;
use crate::transport::{Connect, Destination, TcpConnector};

/// Connections to one destination, shared by any number of tasks.
///
/// Cloning is cheap and every clone refers to the same pool.
pub struct ConnectionPool<C = TcpConnector> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C> {
    destination: Destination,
    connector: C,
    config: PoolConfig,
    state: DeadlockMutex<PoolState>,
    stopping: AtomicBool,
    terminated_fired: AtomicBool,
    terminated: CancellationToken,
    /// Notified when a transaction ends, a connection goes away or a connect gives up
    /// its slot.
    changed: Notify,
    observers: Observers<PoolObserver>,
    span: Span,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Reusable by any caller.
    managed: Vec<HttpConnection>,
    /// Handed to a single caller.
    loaned: Vec<HttpConnection>,
    /// Connects in progress.
    pending: usize,
}

/// A snapshot of how many connections a pool holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionCounts {
    pub managed: usize,
    pub loaned: usize,
    pub pending: usize,
}

impl ConnectionCounts {
    /// What [`PoolConfig::max_connections`] bounds.
    pub fn total(&self) -> usize {
        self.managed + self.loaned + self.pending
    }
}

impl ConnectionPool<TcpConnector> {
    pub fn new(destination: Destination, config: PoolConfig) -> Self {
        Self::with_connector(destination, TcpConnector::new(), config)
    }
}

impl<C> ConnectionPool<C>
where
    C: Connect + Send + Sync + 'static,
{
    pub fn with_connector(destination: Destination, connector: C, config: PoolConfig) -> Self {
        let span = info_span!("pool", %destination);
        let state = DeadlockMutex::new("connection pool", config.deadlock_timeout, PoolState::default());
        Self {
            inner: Arc::new(PoolInner {
                destination,
                connector,
                config,
                state,
                stopping: AtomicBool::new(false),
                terminated_fired: AtomicBool::new(false),
                terminated: CancellationToken::new(),
                changed: Notify::new(),
                observers: Observers::new(),
                span,
            }),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn on_event(&self, observer: Arc<PoolObserver>) {
        self.inner.observers.add(observer);
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.is_cancelled()
    }

    pub fn connection_counts(&self) -> ConnectionCounts {
        let state = self.inner.state.lock();
        ConnectionCounts { managed: state.managed.len(), loaned: state.loaned.len(), pending: state.pending }
    }

    /// Sends `request` on a free or new connection and returns the response, or `None`
    /// once the pool is stopping.
    ///
    /// A reused connection failing with [`HttpError::is_stale_connection`] is replaced and
    /// the request sent again.
    pub async fn send_request_and_receive_response(
        &self,
        request: &Request,
        options: &ReceiveOptions,
    ) -> Result<Option<Response>, HttpError> {
        async {
            loop {
                let Some((mut transaction, reused)) = self.acquire(false).await? else {
                    return Ok(None);
                };

                let result = transaction.send_request_and_receive_response(request, options).await;
                let connection = transaction.connection().clone();
                drop(transaction);

                match result {
                    Ok(response) => {
                        self.inner.emit(&PoolEvent::RequestSentAndResponseReceived {
                            connection: &connection,
                            request,
                            response: &response,
                        });
                        return Ok(Some(response));
                    }
                    Err(e) if reused && e.is_stale_connection() => {
                        debug!(connection = connection.id(), cause = %e, "reused connection was stale, retrying");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        .instrument(self.inner.span.clone())
        .await
    }

    /// Gets a connection for exclusive use, or `None` once the pool is stopping.
    ///
    /// The connection is not reused by the pool until it is given back with
    /// [`ConnectionPool::return_connection`]. It still counts towards
    /// [`PoolConfig::max_connections`] and leaves the pool when it terminates.
    pub async fn get_connection_and_start_transaction(&self) -> Result<Option<Transaction>, HttpError> {
        let acquired = self.acquire(true).instrument(self.inner.span.clone()).await?;
        Ok(acquired.map(|(transaction, _reused)| transaction))
    }

    /// Puts a loaned connection back into rotation. Returns `false` for connections that
    /// are not loaned from this pool.
    pub fn return_connection(&self, connection: &HttpConnection) -> bool {
        let returned = {
            let mut state = self.inner.state.lock();
            match state.loaned.iter().position(|loaned| loaned == connection) {
                Some(index) => {
                    let connection = state.loaned.swap_remove(index);
                    state.managed.push(connection);
                    true
                }
                None => false,
            }
        };

        if returned {
            if self.is_stopping() {
                connection.stop();
            }
            self.inner.changed.notify_waiters();
        }
        returned
    }

    /// Stops creating connections and lets every managed connection finish its current
    /// transaction before closing.
    ///
    /// # Panics
    ///
    /// Loaned connections have to be stopped by their borrowers first.
    pub fn stop(&self) {
        // `stopping` flips under the lock, so a connect finishing concurrently either
        // sees it or shows up in the snapshot
        let (managed, unstopped_loan, first_stop) = {
            let state = self.inner.state.lock();
            match state.loaned.iter().find(|connection| !connection.is_stopping()) {
                Some(loaned) => (Vec::new(), Some(loaned.id()), false),
                None => (state.managed.clone(), None, !self.inner.stopping.swap(true, Ordering::SeqCst)),
            }
        };
        if let Some(id) = unstopped_loan {
            panic!("loaned connection {id} must be stopped before the pool");
        }

        if first_stop {
            self.inner.span.in_scope(|| info!("stopping"));
        }
        for connection in managed {
            connection.stop();
        }
        self.inner.changed.notify_waiters();
        self.inner.check_terminated();
    }

    /// Stops creating connections and terminates every managed connection now.
    pub fn terminate(&self) {
        let managed = {
            let state = self.inner.state.lock();
            self.inner.stopping.store(true, Ordering::SeqCst);
            state.managed.clone()
        };
        self.inner.span.in_scope(|| info!("terminating"));

        for connection in managed {
            connection.terminate();
        }
        self.inner.changed.notify_waiters();
        self.inner.check_terminated();
    }

    /// Completes once the pool stopped and its last connection terminated.
    pub async fn wait_terminated(&self) {
        self.inner.terminated.cancelled().await;
    }

    /// Like [`ConnectionPool::wait_terminated`], giving up after `timeout`. Returns whether
    /// the pool terminated.
    pub async fn wait_terminated_for(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_terminated()).await.is_ok()
    }

    /// Reuses an idle connection or creates one, waiting for a free slot when at the
    /// limit. The flag tells whether the connection was reused.
    async fn acquire(&self, loan: bool) -> Result<Option<(Transaction, bool)>, HttpError> {
        let deadline = Instant::now() + self.inner.config.connect_timeout;
        loop {
            if self.is_stopping() {
                return Ok(None);
            }

            // registered before looking, so a slot freed in between is not missed
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if let Some(transaction) = self.reuse_connection(loan) {
                return Ok(Some((transaction, true)));
            }

            match self.create_connection(loan, deadline).await {
                Ok(transaction) => return Ok(transaction.map(|transaction| (transaction, false))),
                Err(HttpError::MaxConnectionsReached { max }) => {
                    trace!(max, "waiting for a connection slot");
                    if tokio::time::timeout_at(deadline, changed).await.is_err() {
                        return Err(HttpError::MaxConnectionsReached { max });
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn reuse_connection(&self, loan: bool) -> Option<Transaction> {
        // notifications are postponed so no connection leaves `managed` during the scan
        let (candidates, _postponed): (Vec<_>, Vec<_>) = {
            let state = self.inner.state.lock();
            state.managed.iter().map(|connection| (connection.clone(), connection.postpone_terminated_notification())).unzip()
        };

        for connection in candidates {
            let mut transaction = match connection.try_start_transaction() {
                Ok(transaction) => transaction,
                Err(HttpError::Shutdown) if !connection.in_transaction() => {
                    debug!(connection = connection.id(), "terminating idle stopped connection");
                    connection.terminate();
                    continue;
                }
                Err(e) => {
                    trace!(connection = connection.id(), cause = %e, "connection not available");
                    continue;
                }
            };

            // terminates the connection when it went stale
            if let Err(e) = transaction.ensure_ready_to_send() {
                debug!(connection = connection.id(), cause = %e, "skipping stale connection");
                continue;
            }

            if loan {
                let mut state = self.inner.state.lock();
                let Some(index) = state.managed.iter().position(|managed| *managed == connection) else {
                    continue;
                };
                let connection = state.managed.swap_remove(index);
                state.loaned.push(connection);
            }

            trace!(connection = connection.id(), loan, "reusing connection");
            return Some(transaction);
        }
        None
    }

    async fn create_connection(&self, loan: bool, deadline: Instant) -> Result<Option<Transaction>, HttpError> {
        let max = self.inner.config.max_connections;
        let mut pending = {
            let mut state = self.inner.state.lock();
            ensure!(
                state.managed.len() + state.loaned.len() + state.pending < max,
                HttpError::MaxConnectionsReached { max }
            );
            state.pending += 1;
            PendingConnect { pool: &self.inner, armed: true }
        };

        let destination = &self.inner.destination;
        let connected = match tokio::time::timeout_at(deadline, self.inner.connector.connect(destination)).await {
            Ok(Ok(connected)) => Ok(connected),
            Ok(Err(e)) => Err(HttpError::io(e)),
            Err(_elapsed) => Err(HttpError::timeout("connect", self.inner.config.connect_timeout)),
        };
        let connected = match connected {
            Ok(connected) => connected,
            Err(error) => {
                warn!(cause = %error, "connect failed");
                self.inner.emit(&PoolEvent::ConnectionCreateFailed { destination, error: &error });
                return Err(error);
            }
        };

        let connection = HttpConnection::new(connected, self.inner.config.connection.clone());
        self.watch(&connection);
        let transaction = connection.try_start_transaction()?;

        let added = {
            let mut state = self.inner.state.lock();
            pending.complete(&mut state);
            let added = !self.is_stopping();
            if added {
                if loan {
                    state.loaned.push(connection.clone());
                } else {
                    state.managed.push(connection.clone());
                }
            }
            added
        };

        if !added {
            debug!(connection = connection.id(), "pool stopped while connecting");
            drop(transaction);
            connection.terminate();
            self.inner.check_terminated();
            return Ok(None);
        }

        info!(connection = connection.id(), loan, "connection created");
        self.inner.emit(&PoolEvent::ConnectionCreated(&connection));
        Ok(Some(transaction))
    }

    fn watch(&self, connection: &HttpConnection) {
        let pool = Arc::downgrade(&self.inner);
        connection.on_event(Arc::new(move |connection: &HttpConnection, event: &ConnectionEvent<'_>| {
            if let Some(pool) = pool.upgrade() {
                pool.on_connection_event(connection, event);
            }
        }));
    }
}

impl<C> PoolInner<C> {
    fn emit(&self, event: &PoolEvent<'_>) {
        for observer in self.observers.snapshot() {
            observer(event);
        }
    }

    fn on_connection_event(&self, connection: &HttpConnection, event: &ConnectionEvent<'_>) {
        self.emit(&PoolEvent::Connection { connection, event });

        match event {
            ConnectionEvent::TransactionEnded => self.changed.notify_waiters(),
            ConnectionEvent::Terminated => {
                let removed = {
                    let mut state = self.state.lock();
                    remove(&mut state.managed, connection) || remove(&mut state.loaned, connection)
                };
                if removed {
                    self.span.in_scope(|| debug!(connection = connection.id(), "connection removed"));
                }
                self.changed.notify_waiters();
                self.check_terminated();
            }
            _ => {}
        }
    }

    /// Fires [`PoolEvent::Terminated`] once the pool is stopping and holds no connections.
    fn check_terminated(&self) {
        if !self.stopping.load(Ordering::SeqCst) {
            return;
        }

        let empty = {
            let state = self.state.lock();
            state.managed.is_empty() && state.loaned.is_empty() && state.pending == 0
        };
        if empty && !self.terminated_fired.swap(true, Ordering::SeqCst) {
            self.span.in_scope(|| info!("pool terminated"));
            self.terminated.cancel();
            self.emit(&PoolEvent::Terminated);
        }
    }
}

fn remove(connections: &mut Vec<HttpConnection>, connection: &HttpConnection) -> bool {
    match connections.iter().position(|candidate| candidate == connection) {
        Some(index) => {
            connections.swap_remove(index);
            true
        }
        None => false,
    }
}

/// Counts a connect in progress against the limit until it completes or is abandoned.
struct PendingConnect<'a, C> {
    pool: &'a PoolInner<C>,
    armed: bool,
}

impl<C> PendingConnect<'_, C> {
    fn complete(&mut self, state: &mut PoolState) {
        state.pending -= 1;
        self.armed = false;
    }
}

impl<C> Drop for PendingConnect<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().pending -= 1;
            self.pool.changed.notify_waiters();
            self.pool.check_terminated();
        }
    }
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("destination", &self.inner.destination)
            .field("state", &self.inner.state)
            .field("stopping", &self.inner.stopping.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
