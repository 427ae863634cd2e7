//! The round-trip contract between a loader and the document store.

use docbatch_core::{Cx, Document, Error, Outcome};
use std::collections::HashMap;
use std::future::Future;

/// The drained work of one coalescing cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    /// Identifiers to fetch, in registration order.
    pub ids: Vec<String>,
    /// Normalized predicates to evaluate, in registration order.
    pub queries: Vec<String>,
}

impl BatchRequest {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.queries.is_empty()
    }
}

/// The answer to one [`BatchRequest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse {
    /// Documents by identifier. `None` (or an absent entry) means no such document.
    pub documents: HashMap<String, Option<Document>>,
    /// `matches[i]` lists the identifiers matching `queries[i]`.
    pub matches: Vec<Vec<String>>,
}

/// A document store that answers a whole batch in one round trip.
///
/// Implementations must issue exactly one exchange with the backing system
/// per call, and must not cache between calls: caching belongs to the loader.
pub trait Store: Send + Sync {
    fn fetch_batch(
        &self,
        cx: &Cx,
        request: &BatchRequest,
    ) -> impl Future<Output = Outcome<BatchResponse, Error>> + Send;
}
