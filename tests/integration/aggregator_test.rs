// tests/integration/aggregator_test.rs

//! Integration tests for the aggregation cycle
//! Tests: merging live and retired workers, self-exclusion, throughput, sink failures

use super::test_helpers::{TestContext, test_stats_config};
use std::sync::Arc;
use std::time::Duration;
use txnstats::config::StatsConfig;
use txnstats::core::stats::{
    CATALOG_DATABASE_OID, ProcessorTime, QueryMetric, StatsSnapshot, TableAccess, WorkerIdentity,
};

const DB: u32 = 7;

#[tokio::test]
async fn test_single_worker_cycle_reports_counters_and_throughput() {
    let ctx = TestContext::new().await;
    let w1 = ctx.engine.register_worker(1);
    for _ in 0..10 {
        w1.stats().record_commit(DB);
    }
    for _ in 0..2 {
        w1.stats().record_abort(DB);
    }

    let report = ctx.engine.run_cycle().await;

    let counters = report.totals.databases[&DB];
    assert_eq!(counters.txn_committed, 10);
    assert_eq!(counters.txn_aborted, 2);
    assert_eq!(report.sample.cycle, 1);
    assert_eq!(report.sample.instant, 10.0);
    assert_eq!(report.sample.weighted_avg, report.sample.instant);
    assert_eq!(report.sample.lifetime_avg, 10.0);
    assert!(report.committed());

    let rows = ctx.sink.catalog.database_metrics();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].database_oid, DB);
    assert_eq!(rows[0].txn_committed, 10);
    assert_eq!(rows[0].txn_aborted, 2);
}

#[tokio::test]
async fn test_retired_worker_counts_once_after_unregister() {
    let ctx = TestContext::new().await;
    let w1 = ctx.engine.register_worker(1);
    let w2 = ctx.engine.register_worker(2);
    for _ in 0..5 {
        w1.stats().record_commit(DB);
    }
    for _ in 0..7 {
        w2.stats().record_commit(DB);
    }

    let first = ctx.engine.run_cycle().await;
    assert_eq!(first.totals.databases[&DB].txn_committed, 12);
    assert_eq!(first.merged_snapshots, 2);

    drop(w1);
    assert_eq!(ctx.registry.retired_totals().txn_committed(), 5);

    for _ in 0..3 {
        w2.stats().record_commit(DB);
    }
    let second = ctx.engine.run_cycle().await;
    assert_eq!(second.totals.databases[&DB].txn_committed, 15);
    assert_eq!(second.merged_snapshots, 1);
    assert_eq!(second.sample.delta, 3);
}

#[tokio::test]
async fn test_aggregator_identity_is_excluded_from_merge() {
    let ctx = TestContext::new().await;
    let own = Arc::new(StatsSnapshot::new());
    for _ in 0..100 {
        own.record_commit(DB);
    }
    ctx.registry.register(WorkerIdentity::Aggregator, own);

    let worker = ctx.engine.register_worker(1);
    worker.stats().record_commit(DB);

    let report = ctx.engine.run_cycle().await;
    assert_eq!(report.totals.databases[&DB].txn_committed, 1);
    assert_eq!(report.merged_snapshots, 1);
}

#[tokio::test]
async fn test_started_engine_bookkeeping_is_not_workload() {
    // A long interval keeps the background task from running its own cycles.
    let ctx = TestContext::with_config(StatsConfig {
        aggregation_interval_ms: 60_000,
        ..test_stats_config()
    })
    .await;
    ctx.engine.start().unwrap();
    assert!(ctx.registry.contains(WorkerIdentity::Aggregator));

    let first = ctx.engine.run_cycle().await;
    assert!(first.committed());
    let second = ctx.engine.run_cycle().await;

    // The engine recorded its own commits on the catalog database...
    assert_eq!(ctx.engine.own_stats().txn_committed(CATALOG_DATABASE_OID), 2);
    // ...but they never show up in what it aggregates.
    assert!(!second.totals.databases.contains_key(&CATALOG_DATABASE_OID));
    assert_eq!(second.sample.committed, 0);

    ctx.engine.stop().await;
    assert!(!ctx.registry.contains(WorkerIdentity::Aggregator));
    assert_eq!(ctx.registry.retired_totals().txn_committed(), 0);
}

#[tokio::test]
async fn test_completed_queries_are_emitted_exactly_once() {
    let ctx = TestContext::new().await;
    let worker = ctx.engine.register_worker(1);
    worker.stats().enqueue_query(QueryMetric::new("select_one", DB));
    worker.stats().enqueue_query(QueryMetric::new("select_two", DB));

    let first = ctx.engine.run_cycle().await;
    assert_eq!(first.queries, 2);

    let second = ctx.engine.run_cycle().await;
    assert_eq!(second.queries, 0);

    worker.stats().enqueue_query(QueryMetric::new("select_three", DB));
    let third = ctx.engine.run_cycle().await;
    assert_eq!(third.queries, 1);

    let names: Vec<String> = ctx
        .sink
        .catalog
        .query_metrics()
        .into_iter()
        .map(|row| row.name)
        .collect();
    assert_eq!(names, vec!["select_one", "select_two", "select_three"]);
}

#[tokio::test]
async fn test_queries_of_retired_worker_reach_next_cycle() {
    let ctx = TestContext::new().await;
    let worker = ctx.engine.register_worker(1);
    worker.stats().enqueue_query(QueryMetric::new("last_words", DB));
    drop(worker);

    let report = ctx.engine.run_cycle().await;
    assert_eq!(report.queries, 1);
    assert_eq!(ctx.engine.run_cycle().await.queries, 0);
}

#[tokio::test]
async fn test_sink_failure_loses_queries_but_not_counters() {
    let ctx = TestContext::new().await;
    let worker = ctx.engine.register_worker(1);
    for _ in 0..4 {
        worker.stats().record_commit(DB);
    }
    worker.stats().enqueue_query(QueryMetric::new("doomed", DB));

    ctx.sink.fail_next_commit();
    let failed = ctx.engine.run_cycle().await;
    assert!(!failed.committed());
    assert_eq!(ctx.engine.sink_failures(), 1);
    assert!(ctx.sink.catalog.database_metrics().is_empty());
    assert!(ctx.sink.catalog.query_metrics().is_empty());

    worker.stats().record_commit(DB);
    let recovered = ctx.engine.run_cycle().await;
    assert!(recovered.committed());
    assert_eq!(recovered.totals.databases[&DB].txn_committed, 5);
    assert_eq!(recovered.queries, 0);

    let rows = ctx.sink.catalog.database_metrics();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].txn_committed, 5);
    assert!(ctx.sink.catalog.query_metrics().is_empty());
    assert_eq!(ctx.sink.attempts(), 2);
}

#[tokio::test]
async fn test_weighted_average_follows_smoothing_factor() {
    let ctx = TestContext::new().await;
    let worker = ctx.engine.register_worker(1);

    for _ in 0..10 {
        worker.stats().record_commit(DB);
    }
    let first = ctx.engine.run_cycle().await;
    assert_eq!(first.sample.weighted_avg, 10.0);

    for _ in 0..20 {
        worker.stats().record_commit(DB);
    }
    let second = ctx.engine.run_cycle().await;
    assert_eq!(second.sample.instant, 20.0);
    let expected = 0.4 * 20.0 + 0.6 * 10.0;
    assert!((second.sample.weighted_avg - expected).abs() < 1e-9);
    assert!((second.sample.lifetime_avg - 15.0).abs() < 1e-9);

    assert_eq!(ctx.engine.last_sample().await, Some(second.sample));
}

#[tokio::test]
async fn test_table_index_and_latency_are_merged_across_workers() {
    let ctx = TestContext::new().await;
    let w1 = ctx.engine.register_worker(1);
    let w2 = ctx.engine.register_worker(2);

    w1.stats().record_table_read(DB, 3);
    w1.stats().record_table_insert(DB, 3);
    w1.stats().record_index_insert(DB, 3, 9);
    w2.stats().record_table_read(DB, 3);
    w2.stats().record_table_delete(DB, 3);
    w2.stats().record_index_read(DB, 3, 9);
    w1.stats().record_txn_latency(Duration::from_micros(100));
    w2.stats().record_txn_latency(Duration::from_micros(300));

    ctx.engine.run_cycle().await;

    let tables = ctx.sink.catalog.table_metrics();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].reads, 2);
    assert_eq!(tables[0].inserts, 1);
    assert_eq!(tables[0].deletes, 1);
    assert_eq!(tables[0].updates, 0);

    let indexes = ctx.sink.catalog.index_metrics();
    assert_eq!(indexes.len(), 1);
    assert_eq!((indexes[0].table_oid, indexes[0].index_oid), (3, 9));
    assert_eq!(indexes[0].reads, 1);
    assert_eq!(indexes[0].inserts, 1);
}

#[tokio::test]
async fn test_query_rows_carry_access_latency_and_cpu() {
    let ctx = TestContext::new().await;
    let worker = ctx.engine.register_worker(1);
    worker.stats().enqueue_query(
        QueryMetric::new("update_stock", DB)
            .with_access(TableAccess {
                reads: 3,
                updates: 1,
                deletes: 0,
                inserts: 0,
            })
            .with_latency(Duration::from_micros(1500))
            .with_cpu(ProcessorTime {
                user: Duration::from_micros(700),
                system: Duration::from_micros(100),
            }),
    );

    ctx.engine.run_cycle().await;

    let rows = ctx.sink.catalog.query_metrics();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "update_stock");
    assert_eq!(rows[0].database_oid, DB);
    assert_eq!(rows[0].reads, 3);
    assert_eq!(rows[0].updates, 1);
    assert_eq!(rows[0].latency, 1500);
    assert_eq!(rows[0].cpu_time, 800);
    assert_eq!(rows[0].num_params, 0);
}
