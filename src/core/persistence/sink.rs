// src/core/persistence/sink.rs

//! The boundary through which each cycle's aggregate reaches durable storage.

use crate::core::StatsError;
use crate::core::stats::{AggregateAccumulator, Oid, QueryMetric};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseMetricRow {
    pub database_oid: Oid,
    pub txn_committed: u64,
    pub txn_aborted: u64,
    pub time_stamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMetricRow {
    pub database_oid: Oid,
    pub table_oid: Oid,
    pub reads: u64,
    pub updates: u64,
    pub deletes: u64,
    pub inserts: u64,
    pub time_stamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexMetricRow {
    pub database_oid: Oid,
    pub table_oid: Oid,
    pub index_oid: Oid,
    pub reads: u64,
    pub deletes: u64,
    pub inserts: u64,
    pub time_stamp: i64,
}

/// A completed query, flattened for storage. Parameter buffers are hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryMetricRow {
    pub name: String,
    pub database_oid: Oid,
    pub num_params: usize,
    pub param_types: String,
    pub param_formats: String,
    pub param_values: String,
    pub reads: u64,
    pub updates: u64,
    pub deletes: u64,
    pub inserts: u64,
    /// Microseconds.
    pub latency: i64,
    /// User plus system CPU time, in microseconds.
    pub cpu_time: i64,
    pub time_stamp: i64,
}

impl QueryMetricRow {
    fn from_metric(query: &QueryMetric, time_stamp: i64) -> Self {
        let (num_params, param_types, param_formats, param_values) = match &query.params {
            Some(p) => (
                p.num_params,
                hex::encode(&p.type_buf),
                hex::encode(&p.format_buf),
                hex::encode(&p.value_buf),
            ),
            None => (0, String::new(), String::new(), String::new()),
        };
        Self {
            name: query.name.clone(),
            database_oid: query.database_oid,
            num_params,
            param_types,
            param_formats,
            param_values,
            reads: query.access.reads,
            updates: query.access.updates,
            deletes: query.access.deletes,
            inserts: query.access.inserts,
            latency: query.latency.as_micros() as i64,
            cpu_time: query.cpu.total().as_micros() as i64,
            time_stamp,
        }
    }
}

/// Everything one cycle emits, committed as a single unit.
///
/// Tables follow their database and indexes follow their table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsBatch {
    pub time_stamp: i64,
    pub databases: Vec<DatabaseMetricRow>,
    pub tables: Vec<TableMetricRow>,
    pub indexes: Vec<IndexMetricRow>,
    pub queries: Vec<QueryMetricRow>,
}

impl MetricsBatch {
    /// Builds the rows for a cycle. The aggregate's queries were drained from
    /// their sources during the merge, so each appears in exactly one batch.
    pub fn from_aggregate(aggregate: &AggregateAccumulator, time_stamp: i64) -> Self {
        let totals = aggregate.totals();
        let databases = totals
            .databases
            .iter()
            .map(|(oid, c)| DatabaseMetricRow {
                database_oid: *oid,
                txn_committed: c.txn_committed,
                txn_aborted: c.txn_aborted,
                time_stamp,
            })
            .collect();
        let tables = totals
            .tables
            .iter()
            .map(|((db, table), a)| TableMetricRow {
                database_oid: *db,
                table_oid: *table,
                reads: a.reads,
                updates: a.updates,
                deletes: a.deletes,
                inserts: a.inserts,
                time_stamp,
            })
            .collect();
        let indexes = totals
            .indexes
            .iter()
            .map(|((db, table, index), a)| IndexMetricRow {
                database_oid: *db,
                table_oid: *table,
                index_oid: *index,
                reads: a.reads,
                deletes: a.deletes,
                inserts: a.inserts,
                time_stamp,
            })
            .collect();
        let queries = aggregate
            .completed_queries()
            .iter()
            .map(|q| QueryMetricRow::from_metric(q, time_stamp))
            .collect();

        Self {
            time_stamp,
            databases,
            tables,
            indexes,
            queries,
        }
    }

    pub fn row_count(&self) -> usize {
        self.databases.len() + self.tables.len() + self.indexes.len() + self.queries.len()
    }
}

/// Accepts a cycle's batch and commits it durably.
///
/// A commit must be all-or-nothing: on `Err`, none of the batch may be visible.
/// The engine never retries a failed batch.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn commit(&self, batch: &MetricsBatch) -> Result<(), StatsError>;
}

/// A sink that discards every batch.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn commit(&self, _batch: &MetricsBatch) -> Result<(), StatsError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CatalogTables {
    database_metrics: Vec<DatabaseMetricRow>,
    table_metrics: Vec<TableMetricRow>,
    index_metrics: Vec<IndexMetricRow>,
    query_metrics: Vec<QueryMetricRow>,
    commits: u64,
}

/// In-memory metric tables. A batch becomes visible in all four tables at once.
#[derive(Debug, Default)]
pub struct CatalogSink {
    tables: Mutex<CatalogTables>,
}

impl CatalogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_metrics(&self) -> Vec<DatabaseMetricRow> {
        self.tables.lock().database_metrics.clone()
    }

    pub fn table_metrics(&self) -> Vec<TableMetricRow> {
        self.tables.lock().table_metrics.clone()
    }

    pub fn index_metrics(&self) -> Vec<IndexMetricRow> {
        self.tables.lock().index_metrics.clone()
    }

    pub fn query_metrics(&self) -> Vec<QueryMetricRow> {
        self.tables.lock().query_metrics.clone()
    }

    pub fn commits(&self) -> u64 {
        self.tables.lock().commits
    }
}

#[async_trait]
impl PersistenceSink for CatalogSink {
    async fn commit(&self, batch: &MetricsBatch) -> Result<(), StatsError> {
        let mut tables = self.tables.lock();
        tables.database_metrics.extend_from_slice(&batch.databases);
        tables.table_metrics.extend_from_slice(&batch.tables);
        tables.index_metrics.extend_from_slice(&batch.indexes);
        tables.query_metrics.extend_from_slice(&batch.queries);
        tables.commits += 1;
        Ok(())
    }
}

/// Appends each batch as one JSON line to a file.
///
/// The line is serialized in full before anything is written, and written
/// with a single call, so a failed commit leaves no partial batch behind
/// unless the write itself is torn by the operating system.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl PersistenceSink for JsonLinesSink {
    async fn commit(&self, batch: &MetricsBatch) -> Result<(), StatsError> {
        let mut line = serde_json::to_vec(batch)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }
}
