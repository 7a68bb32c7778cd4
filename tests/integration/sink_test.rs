// tests/integration/sink_test.rs

//! Integration tests for the persistence sinks
//! Tests: batch construction, catalog tables, JSON lines files, failure reporting

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use txnstats::core::StatsError;
use txnstats::core::persistence::{
    CatalogSink, JsonLinesSink, MetricsBatch, NullSink, PersistenceSink,
};
use txnstats::core::stats::{
    AggregateAccumulator, ProcessorTime, QueryMetric, QueryParams, StatsSnapshot, TableAccess,
};

fn sample_aggregate() -> AggregateAccumulator {
    let snapshot = StatsSnapshot::new();
    snapshot.record_commit(1);
    snapshot.record_commit(1);
    snapshot.record_abort(2);
    snapshot.record_table_read(1, 100);
    snapshot.record_table_insert(1, 100);
    snapshot.record_index_read(1, 100, 1000);
    snapshot.enqueue_query(
        QueryMetric::new("select_one", 1)
            .with_params(QueryParams {
                num_params: 1,
                type_buf: Bytes::from_static(&[0x17]),
                format_buf: Bytes::from_static(&[0x00]),
                value_buf: Bytes::from_static(b"\x00\x2a"),
            })
            .with_access(TableAccess {
                reads: 4,
                ..TableAccess::default()
            })
            .with_latency(Duration::from_micros(250))
            .with_cpu(ProcessorTime {
                user: Duration::from_micros(30),
                system: Duration::from_micros(12),
            }),
    );

    let mut aggregate = AggregateAccumulator::default();
    aggregate.merge_snapshot(&snapshot);
    aggregate
}

#[test]
fn test_batch_rows_cover_every_counter() {
    let batch = MetricsBatch::from_aggregate(&sample_aggregate(), 1_700_000_000);

    assert_eq!(batch.time_stamp, 1_700_000_000);
    assert_eq!(batch.databases.len(), 2);
    assert_eq!(batch.databases[0].database_oid, 1);
    assert_eq!(batch.databases[0].txn_committed, 2);
    assert_eq!(batch.databases[1].txn_aborted, 1);

    assert_eq!(batch.tables.len(), 1);
    assert_eq!(batch.tables[0].reads, 1);
    assert_eq!(batch.tables[0].inserts, 1);
    assert_eq!(batch.indexes.len(), 1);
    assert_eq!(batch.indexes[0].index_oid, 1000);
    assert_eq!(batch.queries.len(), 1);
    assert_eq!(batch.row_count(), 5);
    assert!(batch.databases.iter().all(|r| r.time_stamp == 1_700_000_000));
}

#[test]
fn test_query_rows_hex_encode_parameters() {
    let batch = MetricsBatch::from_aggregate(&sample_aggregate(), 0);
    let row = &batch.queries[0];

    assert_eq!(row.name, "select_one");
    assert_eq!(row.num_params, 1);
    assert_eq!(row.param_types, "17");
    assert_eq!(row.param_formats, "00");
    assert_eq!(row.param_values, "002a");
    assert_eq!(row.reads, 4);
    assert_eq!(row.latency, 250);
    assert_eq!(row.cpu_time, 42);
}

#[test]
fn test_query_rows_without_parameters_are_empty() {
    let snapshot = StatsSnapshot::new();
    snapshot.enqueue_query(QueryMetric::new("begin", 3));
    let mut aggregate = AggregateAccumulator::default();
    aggregate.merge_snapshot(&snapshot);

    let batch = MetricsBatch::from_aggregate(&aggregate, 0);
    assert_eq!(batch.queries[0].num_params, 0);
    assert!(batch.queries[0].param_values.is_empty());
}

#[tokio::test]
async fn test_catalog_sink_appends_every_table() {
    let sink = CatalogSink::new();
    let batch = MetricsBatch::from_aggregate(&sample_aggregate(), 10);

    sink.commit(&batch).await.unwrap();
    sink.commit(&batch).await.unwrap();

    assert_eq!(sink.commits(), 2);
    assert_eq!(sink.database_metrics().len(), 4);
    assert_eq!(sink.table_metrics().len(), 2);
    assert_eq!(sink.index_metrics().len(), 2);
    assert_eq!(sink.query_metrics().len(), 2);
}

#[tokio::test]
async fn test_null_sink_accepts_everything() {
    let sink: Arc<dyn PersistenceSink> = Arc::new(NullSink);
    let batch = MetricsBatch::from_aggregate(&sample_aggregate(), 10);
    assert!(sink.commit(&batch).await.is_ok());
}

#[tokio::test]
async fn test_json_lines_sink_writes_one_line_per_batch() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.jsonl");
    let sink = JsonLinesSink::new(&path);

    sink.commit(&MetricsBatch::from_aggregate(&sample_aggregate(), 1))
        .await
        .unwrap();
    sink.commit(&MetricsBatch::from_aggregate(&sample_aggregate(), 2))
        .await
        .unwrap();

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["time_stamp"], 1);
    assert_eq!(first["databases"][0]["txn_committed"], 2);
    assert_eq!(first["queries"][0]["param_values"], "002a");

    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["time_stamp"], 2);
}

#[tokio::test]
async fn test_json_lines_sink_reports_io_failure() {
    let dir = TempDir::new().unwrap();
    // A directory cannot be opened for appending.
    let sink = JsonLinesSink::new(dir.path());

    let result = sink
        .commit(&MetricsBatch::from_aggregate(&sample_aggregate(), 1))
        .await;
    assert!(matches!(result, Err(StatsError::Io(_))));
}
