//! Request-scoped connection, transaction and loader lifecycle.
//!
//! A [`ConnectionScope`] serves one request at a time per call to
//! [`ConnectionScope::run`]:
//!
//! 1. borrow a connection from the pool
//! 2. open a transaction and build a loader on that connection
//! 3. run the handler with a [`RequestContext`]
//! 4. roll the transaction back, whatever the handler did
//! 5. hand the connection back to the pool
//!
//! Nothing is ever committed; the transaction only pins a consistent view of
//! the store for the request's reads. A connection whose transaction state is
//! unknown (failed `BEGIN`, failed `ROLLBACK`, or a request dropped mid-flight)
//! is discarded instead of being reused.

use docbatch_core::{
    Connection, Cx, Error, IsolationLevel, Outcome, TransactionError, TransactionErrorKind,
    begin_statement,
};
use docbatch_loader::{BatchLoader, SqlStore, SqlStoreConfig};
use docbatch_pool::{ConnectionFactory, Pool, PooledConnection};
use futures::FutureExt;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// The loader type handed to request handlers.
pub type RequestLoader<'r, C> = BatchLoader<'r, SqlStore<'r, C>>;

/// How each request's transaction is opened and where documents live.
#[derive(Debug, Clone, Default)]
pub struct ScopeConfig {
    /// Open transactions `READ ONLY`
    pub read_only: bool,
    /// Isolation level; `None` uses the server default
    pub isolation: Option<IsolationLevel>,
    /// Document table layout
    pub store: SqlStoreConfig,
}

impl ScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open transactions `READ ONLY`.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Set the document table layout.
    pub fn store(mut self, store: SqlStoreConfig) -> Self {
        self.store = store;
        self
    }
}

/// What a request handler gets to work with.
pub struct RequestContext<'r, C: Connection> {
    loader: RequestLoader<'r, C>,
    cx: &'r Cx,
    request_id: u64,
    started: Instant,
}

impl<'r, C: Connection> RequestContext<'r, C> {
    /// The request's loader; every lookup goes through it.
    pub fn loader(&self) -> &RequestLoader<'r, C> {
        &self.loader
    }

    pub fn cx(&self) -> &'r Cx {
        self.cx
    }

    /// Monotonic per scope, starting at 1.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Time since the request started, connection acquisition included.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl<C: Connection> std::fmt::Debug for RequestContext<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

/// Runs request handlers inside a pooled, rolled-back transaction.
#[derive(Debug)]
pub struct ConnectionScope<'p, F: ConnectionFactory> {
    pool: &'p Pool<F>,
    config: ScopeConfig,
    next_request: AtomicU64,
}

impl<'p, F: ConnectionFactory> ConnectionScope<'p, F> {
    pub fn new(pool: &'p Pool<F>) -> Self {
        Self::with_config(pool, ScopeConfig::default())
    }

    pub fn with_config(pool: &'p Pool<F>, config: ScopeConfig) -> Self {
        Self {
            pool,
            config,
            next_request: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn pool(&self) -> &'p Pool<F> {
        self.pool
    }

    /// Run `handler` for one request.
    ///
    /// The handler's outcome is returned unchanged, except that a failed
    /// `ROLLBACK` after a successful handler surfaces as
    /// [`TransactionErrorKind::Rollback`]. A handler panic is resumed after
    /// the transaction has been rolled back and the connection returned.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let scope = ConnectionScope::new(&pool);
    /// let page = scope
    ///     .run(&cx, async |ctx| ctx.loader().fetch_by_id(&uuid).await)
    ///     .await;
    /// ```
    #[tracing::instrument(level = "debug", skip(self, cx, handler))]
    pub async fn run<T, H>(&self, cx: &Cx, handler: H) -> Outcome<T, Error>
    where
        H: AsyncFnOnce(&RequestContext<'_, F::Conn>) -> Outcome<T, Error>,
    {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let mut conn = match self.pool.acquire(cx).await {
            Outcome::Ok(conn) => conn,
            Outcome::Err(e) => {
                tracing::warn!(request_id, error = %e, "Could not acquire a connection");
                return Outcome::Err(e);
            }
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        };

        // A failed BEGIN leaves `conn` flagged, so dropping it discards it.
        match self.begin(cx, &mut conn, request_id).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        let outcome = {
            let store = SqlStore::with_config(&*conn, &self.config.store);
            let ctx = RequestContext {
                loader: BatchLoader::new(&store, cx),
                cx,
                request_id,
                started,
            };
            let outcome = AssertUnwindSafe(handler(&ctx)).catch_unwind().await;
            let stats = ctx.loader().stats();
            tracing::debug!(
                request_id,
                round_trips = stats.round_trips,
                cache_hits = stats.cache_hits,
                "Handler finished"
            );
            outcome
        };

        let rollback = conn.execute(cx, "ROLLBACK", &[]).await;
        if matches!(rollback, Outcome::Ok(_)) {
            conn.release();
        } else {
            tracing::warn!(request_id, "ROLLBACK failed; discarding connection");
            conn.discard();
        }

        tracing::debug!(
            request_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request finished"
        );

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => resume_unwind(panic),
        };

        match (outcome, rollback) {
            (Outcome::Ok(value), Outcome::Ok(_)) => Outcome::Ok(value),
            (Outcome::Ok(_), Outcome::Err(e)) => Outcome::Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::Rollback,
                message: "ROLLBACK failed".to_string(),
                source: Some(Box::new(e)),
            })),
            (Outcome::Ok(_), Outcome::Cancelled(r)) => Outcome::Cancelled(r),
            (Outcome::Ok(_), Outcome::Panicked(p)) => Outcome::Panicked(p),
            (outcome, rollback) => {
                if let Outcome::Err(e) = &rollback {
                    tracing::warn!(request_id, error = %e, "ROLLBACK failed after handler failure");
                }
                outcome
            }
        }
    }

    /// Open the request's transaction.
    async fn begin(
        &self,
        cx: &Cx,
        conn: &mut PooledConnection<'p, F>,
        request_id: u64,
    ) -> Outcome<(), Error> {
        // Until ROLLBACK succeeds the connection must not be reused.
        conn.set_discard_on_drop(true);

        let sql = begin_statement(self.config.isolation, self.config.read_only);
        match conn.execute(cx, &sql, &[]).await {
            Outcome::Ok(_) => {
                tracing::debug!(request_id, sql = %sql, "Transaction opened");
                Outcome::Ok(())
            }
            Outcome::Err(e) => {
                tracing::warn!(request_id, error = %e, "BEGIN failed; discarding connection");
                Outcome::Err(Error::Transaction(TransactionError {
                    kind: TransactionErrorKind::Begin,
                    message: format!("{sql} failed"),
                    source: Some(Box::new(e)),
                }))
            }
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}
