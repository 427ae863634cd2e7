//! Per-request batching and caching document loader.
//!
//! `docbatch-loader` turns many small document lookups issued while serving
//! one request into as few store round trips as possible:
//!
//! - [`BatchLoader`] - caches and coalesces lookups by identifier and by predicate
//! - [`Store`] - the one-round-trip-per-batch contract a backend implements
//! - [`SqlStore`] - a [`Store`] over a PostgreSQL `jsonb` table
//! - [`interpolate`] / [`Vars`] - placeholder substitution for predicates
//!
//! # Example
//!
//! ```rust,ignore
//! use docbatch_loader::{BatchLoader, SqlStore};
//!
//! let store = SqlStore::new(&*conn);
//! let loader = BatchLoader::new(&store, &cx);
//!
//! let children = loader.fetch_by_query("$.parent == $uuid", &page).await?;
//! ```

pub mod interpolate;
pub mod loader;
pub mod sql_store;
pub mod store;

pub use interpolate::{Vars, interpolate};
pub use loader::{BatchLoader, LoaderStats};
pub use sql_store::{SqlStore, SqlStoreConfig};
pub use store::{BatchRequest, BatchResponse, Store};
