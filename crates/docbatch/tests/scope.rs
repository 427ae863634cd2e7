use asupersync::runtime::RuntimeBuilder;
use docbatch::prelude::*;
use docbatch::{IsolationLevel, PoolErrorKind, Row, TransactionErrorKind, Value};
use futures::FutureExt;
use serde_json::json;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// What every connection opened by a [`MockFactory`] shares.
#[derive(Debug, Default)]
struct Backend {
    /// Every statement, in the order it reached a connection
    log: Vec<String>,
    /// Rows returned by every query
    rows: Vec<Row>,
    fail_begin: bool,
    fail_rollback: bool,
}

#[derive(Debug)]
struct MockConnection {
    backend: Arc<Mutex<Backend>>,
}

impl MockConnection {
    fn record(&self, sql: &str) -> std::sync::MutexGuard<'_, Backend> {
        let mut backend = self.backend.lock().unwrap();
        backend.log.push(sql.to_string());
        backend
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let rows = self.record(sql).rows.clone();
        async move { Outcome::Ok(rows) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        _params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let backend = self.record(sql);
        let fail = (sql.starts_with("BEGIN") && backend.fail_begin)
            || (sql == "ROLLBACK" && backend.fail_rollback);
        drop(backend);
        let sql = sql.to_string();
        async move {
            if fail {
                Outcome::Err(Error::Custom(format!("{sql}: server closed the connection")))
            } else {
                Outcome::Ok(0)
            }
        }
    }

    fn ping(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        async { Outcome::Ok(()) }
    }

    fn close(self, _cx: &Cx) -> impl Future<Output = docbatch::Result<()>> + Send {
        async { Ok(()) }
    }
}

#[derive(Debug, Default)]
struct MockFactory {
    backend: Arc<Mutex<Backend>>,
}

impl ConnectionFactory for MockFactory {
    type Conn = MockConnection;

    fn connect(&self, _cx: &Cx) -> impl Future<Output = Outcome<MockConnection, Error>> + Send {
        let backend = Arc::clone(&self.backend);
        async move { Outcome::Ok(MockConnection { backend }) }
    }
}

fn pool(config: PoolConfig) -> (Pool<MockFactory>, Arc<Mutex<Backend>>) {
    let factory = MockFactory::default();
    let backend = Arc::clone(&factory.backend);
    (Pool::new(config, factory).unwrap(), backend)
}

fn log(backend: &Arc<Mutex<Backend>>) -> Vec<String> {
    backend.lock().unwrap().log.clone()
}

fn columns() -> Vec<String> {
    vec!["index".into(), "id".into(), "object".into()]
}

#[test]
fn successful_request_is_rolled_back_and_released() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        let answer = unwrap_outcome(scope.run(&cx, async |_ctx| Outcome::Ok(42)).await);
        assert_eq!(answer, 42);
    });

    assert_eq!(log(&backend), vec!["BEGIN", "ROLLBACK"]);
    let stats = pool.stats();
    assert_eq!(stats.idle_connections, 1);
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.connections_discarded, 0);
}

#[test]
fn failed_handler_is_rolled_back_and_its_error_returned() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        let outcome = scope
            .run(&cx, async |_ctx| {
                Outcome::<(), Error>::Err(Error::Custom("resolver failed".into()))
            })
            .await;
        match outcome {
            Outcome::Err(Error::Custom(msg)) => assert_eq!(msg, "resolver failed"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    });

    assert_eq!(log(&backend), vec!["BEGIN", "ROLLBACK"]);
    assert_eq!(pool.stats().idle_connections, 1);
}

#[test]
fn failed_begin_discards_connection_and_skips_handler() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    backend.lock().unwrap().fail_begin = true;
    let scope = ConnectionScope::new(&pool);
    let called = AtomicBool::new(false);

    rt.block_on(async {
        let outcome = scope
            .run(&cx, async |_ctx| {
                called.store(true, Ordering::SeqCst);
                Outcome::Ok(())
            })
            .await;
        match outcome {
            Outcome::Err(Error::Transaction(te)) => {
                assert!(matches!(te.kind, TransactionErrorKind::Begin));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    });

    assert!(!called.load(Ordering::SeqCst));
    assert_eq!(log(&backend), vec!["BEGIN"]);
    let stats = pool.stats();
    assert_eq!(stats.total_connections, 0);
    assert_eq!(stats.connections_discarded, 1);
}

#[test]
fn failed_rollback_discards_connection() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    backend.lock().unwrap().fail_rollback = true;
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        match scope.run(&cx, async |_ctx| Outcome::Ok(())).await {
            Outcome::Err(Error::Transaction(te)) => {
                assert!(matches!(te.kind, TransactionErrorKind::Rollback));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    });

    assert_eq!(log(&backend), vec!["BEGIN", "ROLLBACK"]);
    let stats = pool.stats();
    assert_eq!(stats.total_connections, 0);
    assert_eq!(stats.connections_discarded, 1);
}

#[test]
fn handler_error_wins_over_failed_rollback() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    backend.lock().unwrap().fail_rollback = true;
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        let outcome = scope
            .run(&cx, async |_ctx| {
                Outcome::<(), Error>::Err(Error::Custom("resolver failed".into()))
            })
            .await;
        assert!(matches!(outcome, Outcome::Err(Error::Custom(_))));
    });

    assert_eq!(pool.stats().connections_discarded, 1);
}

#[test]
fn handler_panic_is_resumed_after_rollback() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        let result = AssertUnwindSafe(scope.run(&cx, async |_ctx| -> Outcome<(), Error> {
            panic!("resolver exploded")
        }))
        .catch_unwind()
        .await;
        assert!(result.is_err());
    });

    assert_eq!(log(&backend), vec!["BEGIN", "ROLLBACK"]);
    assert_eq!(pool.stats().idle_connections, 1);
}

#[test]
fn begin_statement_follows_scope_config() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    let config = ScopeConfig::new()
        .read_only(true)
        .isolation(IsolationLevel::RepeatableRead);
    let scope = ConnectionScope::with_config(&pool, config);

    rt.block_on(async {
        unwrap_outcome(scope.run(&cx, async |_ctx| Outcome::Ok(())).await);
    });

    assert_eq!(
        log(&backend),
        vec!["BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY", "ROLLBACK"]
    );
}

#[test]
fn lookups_in_one_tick_share_one_query() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    backend.lock().unwrap().rows = vec![
        Row::new(
            columns(),
            vec![
                Value::Null,
                Value::Text("ds".into()),
                Value::Json(json!({"uuid": "ds", "@type": ["Dataset"]})),
            ],
        ),
        Row::new(
            columns(),
            vec![Value::BigInt(0), Value::Null, Value::Json(json!(["f1"]))],
        ),
    ];
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        let (dataset, files, round_trips) = unwrap_outcome(
            scope
                .run(&cx, async |ctx| {
                    let loader = ctx.loader();
                    let query = default_link_from_query("File", "dataset");
                    let (dataset, files) = futures::join!(
                        loader.fetch_by_id("ds"),
                        loader.fetch_by_query(&query, json!({"uuid": "ds"})),
                    );
                    match (dataset, files) {
                        (Outcome::Ok(dataset), Outcome::Ok(files)) => {
                            Outcome::Ok((dataset, files, loader.stats().round_trips))
                        }
                        (Outcome::Err(e), _) | (_, Outcome::Err(e)) => Outcome::Err(e),
                        _ => panic!("lookup did not complete"),
                    }
                })
                .await,
        );
        assert_eq!(dataset, Some(json!({"uuid": "ds", "@type": ["Dataset"]})));
        assert_eq!(files, vec!["f1"]);
        assert_eq!(round_trips, 1);
    });

    let log = log(&backend);
    assert_eq!(log.len(), 3);
    assert_eq!(log[0], "BEGIN");
    assert!(log[1].contains("UNION ALL"));
    assert_eq!(log[2], "ROLLBACK");
}

#[test]
fn requests_are_numbered_and_reuse_the_connection() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        let first = unwrap_outcome(scope.run(&cx, async |ctx| Outcome::Ok(ctx.request_id())).await);
        let second =
            unwrap_outcome(scope.run(&cx, async |ctx| Outcome::Ok(ctx.request_id())).await);
        assert_eq!((first, second), (1, 2));
    });

    assert_eq!(log(&backend), vec!["BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK"]);
    assert_eq!(pool.stats().connections_created, 1);
}

#[test]
fn concurrent_requests_queue_for_a_single_connection() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::new(1).acquire_timeout(0));
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        let (a, b) = futures::join!(
            scope.run(&cx, async |ctx| Outcome::Ok(ctx.request_id())),
            scope.run(&cx, async |ctx| Outcome::Ok(ctx.request_id())),
        );
        assert_eq!((unwrap_outcome(a), unwrap_outcome(b)), (1, 2));
    });

    assert_eq!(log(&backend), vec!["BEGIN", "ROLLBACK", "BEGIN", "ROLLBACK"]);
    let stats = pool.stats();
    assert_eq!(stats.connections_created, 1);
    assert_eq!(stats.pending_requests, 0);
}

#[test]
fn exhausted_pool_times_out_before_the_handler_runs() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::new(1).acquire_timeout(20));
    let scope = ConnectionScope::new(&pool);
    let called = AtomicBool::new(false);

    rt.block_on(async {
        let _held = unwrap_outcome(pool.acquire(&cx).await);
        let outcome = scope
            .run(&cx, async |_ctx| {
                called.store(true, Ordering::SeqCst);
                Outcome::Ok(())
            })
            .await;
        match outcome {
            Outcome::Err(Error::Pool(e)) => assert_eq!(e.kind, PoolErrorKind::Timeout),
            other => panic!("unexpected outcome: {other:?}"),
        }
    });

    assert!(!called.load(Ordering::SeqCst));
    assert!(log(&backend).is_empty());
}

#[test]
fn request_dropped_mid_handler_discards_its_connection() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    let (pool, backend) = pool(PoolConfig::default());
    let scope = ConnectionScope::new(&pool);

    rt.block_on(async {
        {
            let mut abandoned = pin!(scope.run(&cx, async |_ctx| {
                futures::future::pending::<()>().await;
                Outcome::<(), Error>::Ok(())
            }));
            assert!(futures::poll!(abandoned.as_mut()).is_pending());
            assert_eq!(pool.stats().active_connections, 1);
        }

        let stats = pool.stats();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.connections_discarded, 1);

        let next = unwrap_outcome(scope.run(&cx, async |ctx| Outcome::Ok(ctx.request_id())).await);
        assert_eq!(next, 2);
    });

    assert_eq!(log(&backend), vec!["BEGIN", "BEGIN", "ROLLBACK"]);
    let stats = pool.stats();
    assert_eq!(stats.connections_created, 2);
    assert_eq!(stats.idle_connections, 1);
}
