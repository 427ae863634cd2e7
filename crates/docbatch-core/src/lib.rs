//! Core types and traits for docbatch.
//!
//! This crate provides the foundations the loader and the request scope are
//! built on:
//!
//! - `Connection` trait for pooled, transaction-capable database connections
//! - `Row` / `Value` for decoding query results
//! - `Error` taxonomy shared by every crate in the workspace
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Budget, Cx, Outcome};

pub mod connection;
pub mod error;
pub mod identifiers;
pub mod row;
pub mod value;

pub use connection::{Connection, IsolationLevel, begin_statement};
pub use error::{
    BatchError, ConfigError, ConnectionError, ConnectionErrorKind, Error, PoolError,
    PoolErrorKind, QueryError, QueryErrorKind, Result, TransactionError, TransactionErrorKind,
    TypeError,
};
pub use identifiers::quote_ident;
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;

/// A stored document: any JSON value, usually an object.
pub type Document = serde_json::Value;
