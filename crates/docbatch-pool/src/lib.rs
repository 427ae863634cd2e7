//! Connection pooling for docbatch using asupersync.
//!
//! The pool bounds how many connections exist at once and hands each one to
//! exactly one borrower. Borrowers that find the pool at capacity wait in FIFO
//! order and are woken when a connection is returned or discarded.
//!
//! - [`PoolConfig`] - bounds and timeouts
//! - [`ConnectionFactory`] - how new connections are opened
//! - [`Pool`] - the shared pool, created once at startup
//! - [`PooledConnection`] - an exclusive borrow, returned on drop

mod config;
mod waiters;

pub use config::PoolConfig;

use docbatch_core::{Connection, Cx, Error, Outcome, PoolError, PoolErrorKind};
use futures::future::{Either, select};
use futures_timer::Delay;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Instant;
use waiters::WaitQueue;

/// Opens new connections on behalf of a [`Pool`].
pub trait ConnectionFactory: Send + Sync {
    /// The connection type produced.
    type Conn: Connection;

    /// Open a new connection.
    fn connect(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Conn, Error>> + Send;
}

/// Pool statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of connections (active + idle)
    pub total_connections: usize,
    /// Number of idle connections
    pub idle_connections: usize,
    /// Number of active connections
    pub active_connections: usize,
    /// Number of pending acquire requests
    pub pending_requests: usize,
    /// Connections opened over the pool's lifetime
    pub connections_created: u64,
    /// Connections dropped instead of being reused
    pub connections_discarded: u64,
}

struct IdleConn<C> {
    conn: C,
    created_at: Instant,
    idle_since: Instant,
}

struct PoolState<C> {
    idle: VecDeque<IdleConn<C>>,
    /// Idle + checked out + being opened.
    total: usize,
    waiters: WaitQueue,
    closed: bool,
    connections_created: u64,
    connections_discarded: u64,
}

/// A bounded connection pool.
pub struct Pool<F: ConnectionFactory> {
    config: PoolConfig,
    factory: F,
    state: Mutex<PoolState<F::Conn>>,
}

impl<F: ConnectionFactory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a new connection pool.
    ///
    /// No connection is opened here; call [`Pool::warm_up`] to open
    /// `min_connections` eagerly.
    #[allow(clippy::result_large_err)]
    pub fn new(config: PoolConfig, factory: F) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            factory,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                waiters: WaitQueue::default(),
                closed: false,
                connections_created: 0,
                connections_discarded: 0,
            }),
        })
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get the current pool statistics.
    pub fn stats(&self) -> PoolStats {
        let state = self.lock_state();
        PoolStats {
            total_connections: state.total,
            idle_connections: state.idle.len(),
            active_connections: state.total - state.idle.len(),
            pending_requests: state.waiters.len(),
            connections_created: state.connections_created,
            connections_discarded: state.connections_discarded,
        }
    }

    /// Check if the pool is at capacity.
    pub fn at_capacity(&self) -> bool {
        let state = self.lock_state();
        state.total >= self.config.max_connections && state.idle.is_empty()
    }

    /// Whether [`Pool::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }

    /// Borrow a connection, waiting for one to become free if necessary.
    ///
    /// Fails with [`PoolErrorKind::Timeout`] once `acquire_timeout_ms`
    /// elapses, with [`PoolErrorKind::Closed`] after [`Pool::close`], or with
    /// the factory's error when a new connection cannot be opened.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn acquire(&self, cx: &Cx) -> Outcome<PooledConnection<'_, F>, Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }

        let Some(timeout) = self.config.acquire_timeout_duration() else {
            return self.acquire_inner(cx).await;
        };

        let inner = pin!(self.acquire_inner(cx));
        match select(inner, Delay::new(timeout)).await {
            Either::Left((outcome, _)) => outcome,
            Either::Right(((), _)) => {
                tracing::warn!(
                    timeout_ms = self.config.acquire_timeout_ms,
                    "Timed out waiting for a pooled connection"
                );
                Outcome::Err(pool_error(
                    PoolErrorKind::Timeout,
                    format!(
                        "no connection available within {} ms",
                        self.config.acquire_timeout_ms
                    ),
                ))
            }
        }
    }

    async fn acquire_inner(&self, cx: &Cx) -> Outcome<PooledConnection<'_, F>, Error> {
        loop {
            let slot = Checkout {
                pool: self,
                token: None,
            }
            .await;

            match slot {
                Slot::Closed => {
                    return Outcome::Err(pool_error(PoolErrorKind::Closed, "pool is closed"));
                }
                Slot::Idle(idle) => {
                    let mut conn = PooledConnection::new(self, idle.conn, idle.created_at);
                    if self.config.test_on_checkout {
                        // Abandoned mid-ping, the connection is dropped and its slot freed.
                        conn.set_discard_on_drop(true);
                        if !conn.is_valid(cx).await {
                            tracing::debug!("Discarding idle connection that failed validation");
                            conn.discard();
                            continue;
                        }
                        conn.set_discard_on_drop(false);
                    }
                    tracing::debug!("Reusing idle connection");
                    return Outcome::Ok(conn);
                }
                Slot::Open(reservation) => match self.factory.connect(cx).await {
                    Outcome::Ok(conn) => {
                        reservation.fulfil();
                        tracing::debug!("Opened new connection");
                        return Outcome::Ok(PooledConnection::new(self, conn, Instant::now()));
                    }
                    Outcome::Err(e) => {
                        tracing::warn!(error = %e, "Failed to open connection");
                        return Outcome::Err(e);
                    }
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                },
            }
        }
    }

    /// Open connections until `min_connections` exist.
    ///
    /// Returns the number of connections opened.
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn warm_up(&self, cx: &Cx) -> Outcome<usize, Error> {
        let mut opened = 0;
        loop {
            let reservation = {
                let mut state = self.lock_state();
                if state.closed {
                    return Outcome::Err(pool_error(PoolErrorKind::Closed, "pool is closed"));
                }
                if state.total >= self.config.min_connections {
                    break;
                }
                state.total += 1;
                Reservation::new(self)
            };

            match self.factory.connect(cx).await {
                Outcome::Ok(conn) => {
                    reservation.fulfil();
                    let now = Instant::now();
                    let mut state = self.lock_state();
                    state.idle.push_back(IdleConn {
                        conn,
                        created_at: now,
                        idle_since: now,
                    });
                    state.waiters.wake_front();
                    opened += 1;
                }
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            }
        }

        tracing::debug!(opened, "Pool warmed up");
        Outcome::Ok(opened)
    }

    /// Close the pool.
    ///
    /// Idle connections are closed gracefully; connections still checked out
    /// are dropped when their borrowers return them. Pending and future
    /// acquires fail with [`PoolErrorKind::Closed`].
    #[tracing::instrument(level = "debug", skip(self, cx))]
    pub async fn close(&self, cx: &Cx) {
        let idle: Vec<_> = {
            let mut state = self.lock_state();
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            state.connections_discarded += drained.len() as u64;
            state.waiters.wake_all();
            drained
        };

        tracing::info!(closing = idle.len(), "Closing connection pool");
        for entry in idle {
            if let Err(e) = entry.conn.close(cx).await {
                tracing::warn!(error = %e, "Failed to close pooled connection");
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<F::Conn>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop idle connections past their idle timeout or lifetime.
    ///
    /// Idle expiry never shrinks the pool below `min_connections`; lifetime
    /// expiry always applies.
    fn reap(&self, state: &mut PoolState<F::Conn>, now: Instant) -> Vec<F::Conn> {
        let idle_timeout = self.config.idle_timeout_duration();
        let max_lifetime = self.config.max_lifetime_duration();
        let mut reaped = Vec::new();

        let mut i = 0;
        while i < state.idle.len() {
            let entry = &state.idle[i];
            let too_old = max_lifetime.is_some_and(|max| now.duration_since(entry.created_at) >= max);
            let too_idle = idle_timeout.is_some_and(|max| now.duration_since(entry.idle_since) >= max)
                && state.total > self.config.min_connections;

            if too_old || too_idle {
                if let Some(entry) = state.idle.remove(i) {
                    state.total -= 1;
                    state.connections_discarded += 1;
                    reaped.push(entry.conn);
                }
            } else {
                i += 1;
            }
        }

        if !reaped.is_empty() {
            tracing::debug!(reaped = reaped.len(), "Expired idle connections");
        }
        reaped
    }

    /// Return a connection to the idle list.
    fn put_back(&self, conn: F::Conn, created_at: Instant) {
        let now = Instant::now();
        let expired = self
            .config
            .max_lifetime_duration()
            .is_some_and(|max| now.duration_since(created_at) >= max);

        let mut state = self.lock_state();
        if state.closed || expired {
            state.total -= 1;
            state.connections_discarded += 1;
            state.waiters.wake_front();
            drop(state);
            drop(conn);
            return;
        }

        state.idle.push_back(IdleConn {
            conn,
            created_at,
            idle_since: now,
        });
        state.waiters.wake_front();
    }

    /// Drop a checked-out connection and free its slot.
    fn forget(&self, conn: F::Conn) {
        {
            let mut state = self.lock_state();
            state.total -= 1;
            state.connections_discarded += 1;
            state.waiters.wake_front();
        }
        drop(conn);
    }
}

fn pool_error(kind: PoolErrorKind, message: impl Into<String>) -> Error {
    Error::Pool(PoolError {
        kind,
        message: message.into(),
        source: None,
    })
}

/// A claim on one unit of pool capacity while a connection is being opened.
///
/// Dropping it unfulfilled (connect failed, or the acquire was abandoned)
/// frees the slot for the next waiter.
struct Reservation<'p, F: ConnectionFactory> {
    pool: &'p Pool<F>,
    armed: bool,
}

impl<'p, F: ConnectionFactory> Reservation<'p, F> {
    fn new(pool: &'p Pool<F>) -> Self {
        Self { pool, armed: true }
    }

    fn fulfil(mut self) {
        self.armed = false;
        self.pool.lock_state().connections_created += 1;
    }
}

impl<F: ConnectionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.pool.lock_state();
            state.total -= 1;
            state.waiters.wake_front();
        }
    }
}

enum Slot<'p, F: ConnectionFactory> {
    Idle(IdleConn<F::Conn>),
    Open(Reservation<'p, F>),
    Closed,
}

/// Waits for either an idle connection or free capacity.
struct Checkout<'p, F: ConnectionFactory> {
    pool: &'p Pool<F>,
    token: Option<u64>,
}

impl<'p, F: ConnectionFactory> Checkout<'p, F> {
    fn leave(&mut self, state: &mut PoolState<F::Conn>) {
        if let Some(token) = self.token.take() {
            state.waiters.remove(token);
        }
    }
}

impl<'p, F: ConnectionFactory> Future for Checkout<'p, F> {
    type Output = Slot<'p, F>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let pool = this.pool;
        let mut state = pool.lock_state();

        if state.closed {
            this.leave(&mut state);
            return Poll::Ready(Slot::Closed);
        }

        let mut reaped = Vec::new();
        if state.waiters.is_turn(this.token) {
            reaped = pool.reap(&mut state, Instant::now());

            let slot = if let Some(idle) = state.idle.pop_back() {
                Some(Slot::Idle(idle))
            } else if state.total < pool.config.max_connections {
                state.total += 1;
                Some(Slot::Open(Reservation::new(pool)))
            } else {
                None
            };

            if let Some(slot) = slot {
                this.leave(&mut state);
                // Pass the turn on if there is still something to hand out.
                if !state.idle.is_empty() || state.total < pool.config.max_connections {
                    state.waiters.wake_front();
                }
                drop(state);
                drop(reaped);
                return Poll::Ready(slot);
            }
        }

        this.token = Some(state.waiters.register(this.token, cx.waker()));
        drop(state);
        drop(reaped);
        Poll::Pending
    }
}

impl<F: ConnectionFactory> Drop for Checkout<'_, F> {
    fn drop(&mut self) {
        if self.token.is_some() {
            let mut state = self.pool.lock_state();
            self.leave(&mut state);
            state.waiters.wake_front();
        }
    }
}

/// A connection borrowed from the pool.
///
/// Dropping it returns the connection to the pool; [`PooledConnection::discard`]
/// drops the connection instead so it is never handed out again.
pub struct PooledConnection<'p, F: ConnectionFactory> {
    pool: &'p Pool<F>,
    conn: Option<F::Conn>,
    created_at: Instant,
    discard_on_drop: bool,
}

impl<'p, F: ConnectionFactory> PooledConnection<'p, F> {
    fn new(pool: &'p Pool<F>, conn: F::Conn, created_at: Instant) -> Self {
        Self {
            pool,
            conn: Some(conn),
            created_at,
            discard_on_drop: false,
        }
    }

    /// Return the connection to the pool for reuse.
    pub fn release(mut self) {
        self.discard_on_drop = false;
        drop(self);
    }

    /// Drop the connection and free its slot.
    ///
    /// Used when the connection's state is unknown, e.g. after a failed
    /// `BEGIN` or `ROLLBACK`.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!("Discarding pooled connection");
            self.pool.forget(conn);
        }
    }

    /// Make a plain drop discard the connection instead of returning it.
    ///
    /// Set while the connection is in a state another borrower must not
    /// inherit, such as an open transaction. [`PooledConnection::release`]
    /// still returns it.
    pub fn set_discard_on_drop(&mut self, discard: bool) {
        self.discard_on_drop = discard;
    }

    /// When this connection was opened.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for PooledConnection<'_, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created_at", &self.created_at)
            .field("discard_on_drop", &self.discard_on_drop)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> std::ops::Deref for PooledConnection<'_, F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after being returned"),
        }
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<'_, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if self.discard_on_drop {
                tracing::debug!("Discarding connection dropped in an unknown state");
                self.pool.forget(conn);
            } else {
                self.pool.put_back(conn, self.created_at);
            }
        }
    }
}
