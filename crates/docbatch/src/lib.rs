//! docbatch - per-request batched, cached document loading.
//!
//! A request handler issues many small lookups: a document by identifier,
//! the identifiers of documents matching a jsonpath predicate, the documents
//! a field points at. docbatch serves all of them from one pooled
//! connection, inside one rolled-back transaction, coalescing the lookups
//! made in the same tick into a single store round trip and caching every
//! answer for the rest of the request.
//!
//! - [`ConnectionScope`] - connection, transaction and loader lifecycle per request
//! - [`BatchLoader`] - the coalescing, caching loader handed to handlers
//! - [`Pool`] - bounded connection pool with FIFO waiters
//! - [`links`] - following forward references and reverse links
//!
//! # Quick Start
//!
//! ```ignore
//! use docbatch::prelude::*;
//!
//! async fn handle(cx: &Cx, scope: &ConnectionScope<'_, PgFactory>, uuid: &str) -> Outcome<Vec<Option<Document>>, Error> {
//!     scope
//!         .run(cx, async |ctx| {
//!             let page = match ctx.loader().fetch_by_id(uuid).await {
//!                 Outcome::Ok(Some(page)) => page,
//!                 Outcome::Ok(None) => return Outcome::Ok(Vec::new()),
//!                 Outcome::Err(e) => return Outcome::Err(e),
//!                 Outcome::Cancelled(r) => return Outcome::Cancelled(r),
//!                 Outcome::Panicked(p) => return Outcome::Panicked(p),
//!             };
//!             let query = default_link_from_query("Page", "parent");
//!             resolve_link_from(ctx.loader(), &query, &page).await
//!         })
//!         .await
//! }
//! ```

pub mod links;
pub mod scope;

pub use docbatch_core::{
    BatchError, Budget, ConfigError, Connection, ConnectionError, ConnectionErrorKind, Cx,
    Document, Error, FromValue, IsolationLevel, Outcome, PoolError, PoolErrorKind, QueryError,
    QueryErrorKind, Result, Row, TransactionError, TransactionErrorKind, TypeError, Value,
};
pub use docbatch_loader::{
    BatchLoader, BatchRequest, BatchResponse, LoaderStats, SqlStore, SqlStoreConfig, Store, Vars,
    interpolate,
};
pub use docbatch_pool::{ConnectionFactory, Pool, PoolConfig, PoolStats, PooledConnection};
pub use links::{
    default_link_from_query, jsonpath_ident, link_from_query, resolve_link_from, resolve_ref,
    resolve_ref_list,
};
pub use scope::{ConnectionScope, RequestContext, RequestLoader, ScopeConfig};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use docbatch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Core types
        Connection,
        Document,
        Error,
        // Loading
        BatchLoader,
        Store,
        Vars,
        // Request lifecycle
        ConnectionFactory,
        ConnectionScope,
        Pool,
        PoolConfig,
        RequestContext,
        ScopeConfig,
        // Links
        default_link_from_query,
        resolve_link_from,
        resolve_ref,
        resolve_ref_list,
    };
}
