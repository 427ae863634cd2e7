//! The per-request batching and caching loader.
//!
//! Every lookup first consults the request's caches. Misses are parked in a
//! pending set and the caller waits for the batch that drains them. At most
//! one batch runs at a time; it yields to the scheduler once before draining
//! so that every lookup issued in the same tick rides along, then answers the
//! whole set with one [`Store::fetch_batch`] round trip.
//!
//! Results are cached for the lifetime of the loader, including negative
//! results: a missing document caches as `None` and a predicate without
//! matches caches as an empty list.

use crate::interpolate::{Vars, interpolate};
use crate::store::{BatchRequest, BatchResponse, Store};
use docbatch_core::{BatchError, Cx, Document, Error, Outcome};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

/// Counters describing what a loader has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Batches that drained their pending sets
    pub batches_started: u64,
    /// Batches whose results were cached
    pub batches_completed: u64,
    /// Batches whose round trip failed
    pub batches_failed: u64,
    /// Round trips issued to the store (empty batches skip the store)
    pub round_trips: u64,
    /// Identifiers sent to the store
    pub ids_fetched: u64,
    /// Predicates sent to the store
    pub queries_fetched: u64,
    /// Lookups answered from cache without waiting
    pub cache_hits: u64,
}

type InFlight<'a> = Shared<BoxFuture<'a, Result<u64, BatchError>>>;

/// Insertion-ordered set of keys awaiting the next batch.
#[derive(Debug, Default)]
struct PendingSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl PendingSet {
    fn insert(&mut self, key: &str) {
        if self.members.insert(key.to_string()) {
            self.order.push(key.to_string());
        }
    }

    fn take(&mut self) -> Vec<String> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }
}

struct LoaderState<'a> {
    id_cache: HashMap<String, Option<Document>>,
    query_cache: HashMap<String, Vec<String>>,
    pending_ids: PendingSet,
    pending_queries: PendingSet,
    /// Batches started so far; also the index the next batch will take.
    batch_counter: u64,
    completed_batch: Option<u64>,
    in_flight: Option<InFlight<'a>>,
    stats: LoaderStats,
}

impl LoaderState<'_> {
    fn is_complete(&self, target: u64) -> bool {
        self.completed_batch.is_some_and(|done| done >= target)
    }

    /// Drain both pending sets under a fresh batch index.
    fn drain(&mut self) -> (u64, BatchRequest) {
        let batch = self.batch_counter;
        self.batch_counter += 1;
        self.stats.batches_started += 1;
        let request = BatchRequest {
            ids: self.pending_ids.take(),
            queries: self.pending_queries.take(),
        };
        (batch, request)
    }

    fn complete(&mut self, batch: u64, request: BatchRequest, mut response: BatchResponse) {
        let mut matches = response.matches.into_iter();
        for id in request.ids {
            let doc = response.documents.remove(&id).flatten();
            self.id_cache.entry(id).or_insert(doc);
        }
        for query in request.queries {
            let ids = matches.next().unwrap_or_default();
            self.query_cache.entry(query).or_insert(ids);
        }

        self.in_flight = None;
        self.completed_batch = Some(batch);
        self.stats.batches_completed += 1;
    }
}

enum Lookup<T> {
    Ready(T),
    /// Registered; wait until this batch index has completed.
    Wait(u64),
}

/// A cache a lookup key belongs to.
trait CacheKey {
    type Output: Send;

    /// Answer from cache, or register the key as pending.
    fn lookup(&self, state: &mut LoaderState<'_>) -> Lookup<Self::Output>;
}

struct IdKey(String);

impl CacheKey for IdKey {
    type Output = Option<Document>;

    fn lookup(&self, state: &mut LoaderState<'_>) -> Lookup<Self::Output> {
        if let Some(doc) = state.id_cache.get(&self.0) {
            return Lookup::Ready(doc.clone());
        }
        state.pending_ids.insert(&self.0);
        Lookup::Wait(state.batch_counter)
    }
}

struct QueryKey(String);

impl CacheKey for QueryKey {
    type Output = Vec<String>;

    fn lookup(&self, state: &mut LoaderState<'_>) -> Lookup<Self::Output> {
        if let Some(ids) = state.query_cache.get(&self.0) {
            return Lookup::Ready(ids.clone());
        }
        state.pending_queries.insert(&self.0);
        Lookup::Wait(state.batch_counter)
    }
}

/// Batching, caching document loader scoped to one request.
///
/// The loader borrows the store and the request's `Cx`, so it cannot outlive
/// the request that created it.
///
/// # Example
///
/// ```rust,ignore
/// let loader = BatchLoader::new(&store, &cx);
/// let (p, q) = futures::join!(loader.fetch_by_id("p"), loader.fetch_by_id("q"));
/// // one round trip fetched both
/// ```
pub struct BatchLoader<'a, S: Store> {
    store: &'a S,
    cx: &'a Cx,
    state: Arc<Mutex<LoaderState<'a>>>,
}

impl<'a, S: Store> BatchLoader<'a, S> {
    pub fn new(store: &'a S, cx: &'a Cx) -> Self {
        Self {
            store,
            cx,
            state: Arc::new(Mutex::new(LoaderState {
                id_cache: HashMap::new(),
                query_cache: HashMap::new(),
                pending_ids: PendingSet::default(),
                pending_queries: PendingSet::default(),
                batch_counter: 0,
                completed_batch: None,
                in_flight: None,
                stats: LoaderStats::default(),
            })),
        }
    }

    /// The store batches are sent to.
    pub fn store(&self) -> &'a S {
        self.store
    }

    /// The request context batches run under.
    pub fn cx(&self) -> &'a Cx {
        self.cx
    }

    pub fn stats(&self) -> LoaderStats {
        self.lock().stats
    }

    /// Fetch a document by identifier.
    ///
    /// Resolves to `None` when the store has no such document. The lookup is
    /// registered when this method is called, not when the future is first
    /// polled, so lookups issued back to back share a batch regardless of
    /// the order they are awaited in.
    pub fn fetch_by_id<'s>(
        &'s self,
        id: &str,
    ) -> impl Future<Output = Outcome<Option<Document>, Error>> + Send + use<'s, 'a, S> {
        let key = IdKey(id.to_string());
        let first = self.register(&key);
        if matches!(first, Lookup::Ready(_)) {
            tracing::trace!(id, "Document cache hit");
        }
        self.resolve(key, first)
    }

    /// Fetch the identifiers of documents matching a predicate.
    ///
    /// `template` may contain one `$name` placeholder, filled from `vars`
    /// (see [`interpolate`]); the filled-in predicate is the cache key.
    pub fn fetch_by_query<'s, V: Into<Vars>>(
        &'s self,
        template: &str,
        vars: V,
    ) -> impl Future<Output = Outcome<Vec<String>, Error>> + Send + use<'s, 'a, S, V> {
        let key = QueryKey(interpolate(template, &vars.into()));
        let first = self.register(&key);
        if matches!(first, Lookup::Ready(_)) {
            tracing::trace!(query = %key.0, "Query cache hit");
        }
        self.resolve(key, first)
    }

    fn register<K: CacheKey>(&self, key: &K) -> Lookup<K::Output> {
        let mut state = self.lock();
        let lookup = key.lookup(&mut state);
        if matches!(lookup, Lookup::Ready(_)) {
            state.stats.cache_hits += 1;
        }
        lookup
    }

    async fn resolve<K: CacheKey>(&self, key: K, first: Lookup<K::Output>) -> Outcome<K::Output, Error> {
        let mut lookup = first;
        loop {
            let target = match lookup {
                Lookup::Ready(value) => return Outcome::Ok(value),
                Lookup::Wait(target) => target,
            };

            if let Err(e) = self.converge(target).await {
                return Outcome::Err(Error::Batch(e));
            }

            // Still missing only if the batch that drained this key failed
            // before we got to await it; register again for a fresh batch.
            lookup = key.lookup(&mut self.lock());
        }
    }

    /// Wait until batch `target` has completed, starting batches as needed.
    async fn converge(&self, target: u64) -> Result<(), BatchError> {
        loop {
            let fetch = {
                let mut state = self.lock();
                if state.is_complete(target) {
                    return Ok(());
                }
                match &state.in_flight {
                    Some(fetch) => fetch.clone(),
                    None => {
                        let fetch = self.start_fetch();
                        state.in_flight = Some(fetch.clone());
                        fetch
                    }
                }
            };
            fetch.await?;
        }
    }

    fn start_fetch(&self) -> InFlight<'a> {
        let state = Arc::clone(&self.state);
        let store = self.store;
        let cx = self.cx;
        async move { run_batch(&state, store, cx).await }
            .boxed()
            .shared()
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState<'a>> {
        lock_state(&self.state)
    }
}

impl<S: Store> std::fmt::Debug for BatchLoader<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("BatchLoader")
            .field("cached_ids", &state.id_cache.len())
            .field("cached_queries", &state.query_cache.len())
            .field("batch_counter", &state.batch_counter)
            .field("completed_batch", &state.completed_batch)
            .field("in_flight", &state.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Store> Drop for BatchLoader<'_, S> {
    fn drop(&mut self) {
        // The in-flight future holds the state; break the cycle.
        let in_flight = self.lock().in_flight.take();
        drop(in_flight);
    }
}

fn lock_state<'m, 'a>(state: &'m Mutex<LoaderState<'a>>) -> MutexGuard<'m, LoaderState<'a>> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn run_batch<S: Store>(
    state: &Mutex<LoaderState<'_>>,
    store: &S,
    cx: &Cx,
) -> Result<u64, BatchError> {
    YieldNow { yielded: false }.await;

    let (batch, request) = {
        let mut guard = lock_state(state);
        let (batch, request) = guard.drain();
        if request.is_empty() {
            guard.complete(batch, request, BatchResponse::default());
            tracing::debug!(batch, "Empty batch completed without a round trip");
            return Ok(batch);
        }
        guard.stats.round_trips += 1;
        guard.stats.ids_fetched += request.ids.len() as u64;
        guard.stats.queries_fetched += request.queries.len() as u64;
        (batch, request)
    };

    tracing::debug!(
        batch,
        ids = request.ids.len(),
        queries = request.queries.len(),
        "Dispatching batch"
    );

    let outcome = store.fetch_batch(cx, &request).await;

    let mut guard = lock_state(state);
    let error = match outcome {
        Outcome::Ok(response) => {
            guard.complete(batch, request, response);
            tracing::debug!(batch, "Batch completed");
            return Ok(batch);
        }
        Outcome::Err(e) => e,
        Outcome::Cancelled(reason) => {
            tracing::debug!(batch, reason = ?reason, "Batch cancelled");
            Error::Cancelled
        }
        Outcome::Panicked(payload) => Error::Custom(format!("store panicked: {payload:?}")),
    };

    guard.in_flight = None;
    guard.stats.batches_failed += 1;
    tracing::warn!(batch, error = %error, "Batch failed");
    Err(BatchError {
        batch,
        source: Arc::new(error),
    })
}

/// Returns `Pending` once, waking itself, then completes.
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use serde_json::json;

    fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
        match outcome {
            Outcome::Ok(v) => v,
            other => std::panic::panic_any(format!("unexpected outcome: {other:?}")),
        }
    }

    async fn yield_now() {
        YieldNow { yielded: false }.await;
    }

    #[derive(Debug, Default)]
    struct MockState {
        documents: HashMap<String, Document>,
        matches: HashMap<String, Vec<String>>,
        requests: Vec<BatchRequest>,
        /// Scheduler yields before answering
        latency: usize,
        fail_next: usize,
        active: usize,
        max_active: usize,
    }

    #[derive(Debug, Clone, Default)]
    struct MockStore {
        state: Arc<Mutex<MockState>>,
    }

    impl MockStore {
        fn with_documents(docs: &[(&str, Document)]) -> Self {
            let store = Self::default();
            store.state.lock().unwrap().documents = docs
                .iter()
                .map(|(id, doc)| ((*id).to_string(), doc.clone()))
                .collect();
            store
        }

        fn with_match(self, query: &str, ids: &[&str]) -> Self {
            self.state.lock().unwrap().matches.insert(
                query.to_string(),
                ids.iter().map(|id| (*id).to_string()).collect(),
            );
            self
        }

        fn requests(&self) -> Vec<BatchRequest> {
            self.state.lock().unwrap().requests.clone()
        }
    }

    impl Store for MockStore {
        fn fetch_batch(
            &self,
            _cx: &Cx,
            request: &BatchRequest,
        ) -> impl Future<Output = Outcome<BatchResponse, Error>> + Send {
            let state = Arc::clone(&self.state);
            let request = request.clone();
            async move {
                let (latency, fail) = {
                    let mut guard = state.lock().unwrap();
                    guard.requests.push(request.clone());
                    guard.active += 1;
                    guard.max_active = guard.max_active.max(guard.active);
                    let fail = guard.fail_next > 0;
                    if fail {
                        guard.fail_next -= 1;
                    }
                    (guard.latency, fail)
                };

                for _ in 0..latency {
                    yield_now().await;
                }

                let mut guard = state.lock().unwrap();
                guard.active -= 1;
                if fail {
                    return Outcome::Err(Error::Custom("store unavailable".into()));
                }

                let documents = request
                    .ids
                    .iter()
                    .filter_map(|id| {
                        guard
                            .documents
                            .get(id)
                            .map(|doc| (id.clone(), Some(doc.clone())))
                    })
                    .collect();
                let matches = request
                    .queries
                    .iter()
                    .map_while(|q| guard.matches.get(q).cloned())
                    .collect();
                Outcome::Ok(BatchResponse { documents, matches })
            }
        }
    }

    #[test]
    fn query_without_vars_is_keyed_with_null() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::default().with_match("$.a == null", &["p"]);
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            let first = unwrap_outcome(loader.fetch_by_query("$.a == $x", Vars::None).await);
            let second = unwrap_outcome(loader.fetch_by_query("$.a == $x", Document::Null).await);
            assert_eq!(first, vec!["p"]);
            assert_eq!(second, vec!["p"]);
        });

        let requests = store.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].queries, vec!["$.a == null"]);
        assert_eq!(loader.stats().cache_hits, 1);
    }

    #[test]
    fn concurrent_lookups_share_one_round_trip() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::with_documents(&[("a", json!({"n": 1})), ("b", json!({"n": 2}))]);
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            let (a, b) = futures::join!(loader.fetch_by_id("a"), loader.fetch_by_id("b"));
            assert_eq!(unwrap_outcome(a), Some(json!({"n": 1})));
            assert_eq!(unwrap_outcome(b), Some(json!({"n": 2})));
        });

        assert_eq!(
            store.requests(),
            vec![BatchRequest {
                ids: vec!["a".into(), "b".into()],
                queries: vec![],
            }]
        );
    }

    #[test]
    fn registration_happens_at_call_time() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::with_documents(&[("p", json!("P")), ("q", json!("Q"))]);
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            let p = loader.fetch_by_id("p");
            let q = loader.fetch_by_id("q");
            assert_eq!(unwrap_outcome(p.await), Some(json!("P")));
            assert_eq!(unwrap_outcome(q.await), Some(json!("Q")));
        });

        let requests = store.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].ids, vec!["p".to_string(), "q".to_string()]);
    }

    #[test]
    fn ids_and_predicates_share_one_round_trip() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::with_documents(&[("a", json!({"a": 5}))])
            .with_match("$.a == 5", &["a"])
            .with_match("$.a == 6", &[]);
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            let (doc, five, six) = futures::join!(
                loader.fetch_by_id("a"),
                loader.fetch_by_query("$.a == $x", json!({"x": 5})),
                loader.fetch_by_query("$.a == $x", json!({"x": 6})),
            );
            assert!(unwrap_outcome(doc).is_some());
            assert_eq!(unwrap_outcome(five), vec!["a".to_string()]);
            assert!(unwrap_outcome(six).is_empty());
        });

        assert_eq!(
            store.requests(),
            vec![BatchRequest {
                ids: vec!["a".into()],
                queries: vec!["$.a == 5".into(), "$.a == 6".into()],
            }]
        );
    }

    #[test]
    fn missing_documents_are_cached_as_null() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::default();
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            assert_eq!(unwrap_outcome(loader.fetch_by_id("ghost").await), None);
            assert_eq!(unwrap_outcome(loader.fetch_by_id("ghost").await), None);
        });

        assert_eq!(store.requests().len(), 1);
        let stats = loader.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.round_trips, 1);
    }

    #[test]
    fn unmatched_predicates_are_cached_as_empty() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::default();
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            assert!(unwrap_outcome(loader.fetch_by_query("$.x == 1", Vars::None).await).is_empty());
            assert!(unwrap_outcome(loader.fetch_by_query("$.x == 1", Vars::None).await).is_empty());
        });

        assert_eq!(store.requests().len(), 1);
    }

    #[test]
    fn resolved_keys_are_never_refetched() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::with_documents(&[("a", json!(1)), ("b", json!(2))]);
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            unwrap_outcome(loader.fetch_by_id("a").await);
            let (a, b) = futures::join!(loader.fetch_by_id("a"), loader.fetch_by_id("b"));
            assert_eq!(unwrap_outcome(a), Some(json!(1)));
            assert_eq!(unwrap_outcome(b), Some(json!(2)));
        });

        let requests = store.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].ids, vec!["b".to_string()]);
    }

    #[test]
    fn key_registered_mid_batch_joins_the_next_batch() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::with_documents(&[("a", json!(1)), ("b", json!(2))]);
        store.state.lock().unwrap().latency = 3;
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            let first = loader.fetch_by_id("a");
            let late = async {
                while store.requests().is_empty() {
                    yield_now().await;
                }
                loader.fetch_by_id("b").await
            };
            let (a, b) = futures::join!(first, late);
            assert_eq!(unwrap_outcome(a), Some(json!(1)));
            assert_eq!(unwrap_outcome(b), Some(json!(2)));
        });

        let requests = store.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].ids, vec!["a".to_string()]);
        assert_eq!(requests[1].ids, vec!["b".to_string()]);

        let stats = loader.stats();
        assert_eq!(stats.ids_fetched, 2);
        assert_eq!(stats.batches_completed, 2);
    }

    #[test]
    fn at_most_one_round_trip_in_flight() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::default();
        store.state.lock().unwrap().latency = 2;
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            let waves = (0..4).map(|wave| {
                let loader = &loader;
                async move {
                    for _ in 0..wave {
                        yield_now().await;
                    }
                    loader.fetch_by_id(&format!("id-{wave}")).await
                }
            });
            for outcome in futures::future::join_all(waves).await {
                assert_eq!(unwrap_outcome(outcome), None);
            }
        });

        let state = store.state.lock().unwrap();
        assert_eq!(state.max_active, 1);
        assert!(state.requests.len() >= 2);
        let total: usize = state.requests.iter().map(|r| r.ids.len()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn failed_batch_reaches_every_waiter_and_next_call_retries() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::with_documents(&[("a", json!(1))]);
        store.state.lock().unwrap().fail_next = 1;
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            let (a, b) = futures::join!(loader.fetch_by_id("a"), loader.fetch_by_id("b"));
            for outcome in [a, b] {
                match outcome {
                    Outcome::Err(Error::Batch(e)) => {
                        assert_eq!(e.batch, 0);
                        assert!(matches!(e.cause(), Error::Custom(_)));
                    }
                    other => panic!("expected batch error, got {other:?}"),
                }
            }

            assert_eq!(unwrap_outcome(loader.fetch_by_id("a").await), Some(json!(1)));
        });

        assert_eq!(store.requests().len(), 2);
        let stats = loader.stats();
        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.batches_completed, 1);
    }

    #[test]
    fn unawaited_lookup_survives_a_failed_batch() {
        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let store = MockStore::with_documents(&[("a", json!(1)), ("b", json!(2))]);
        store.state.lock().unwrap().fail_next = 1;
        let loader = BatchLoader::new(&store, &cx);

        rt.block_on(async {
            // Registered with the failing batch but never polled while it ran.
            let b = loader.fetch_by_id("b");
            assert!(matches!(loader.fetch_by_id("a").await, Outcome::Err(_)));
            assert_eq!(unwrap_outcome(b.await), Some(json!(2)));
        });

        let requests = store.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].ids, vec!["b".to_string()]);
    }

    #[test]
    fn pending_set_keeps_first_insertion_order() {
        let mut set = PendingSet::default();
        set.insert("b");
        set.insert("a");
        set.insert("b");
        assert_eq!(set.take(), vec!["b".to_string(), "a".to_string()]);
        assert!(set.take().is_empty());
    }
}
