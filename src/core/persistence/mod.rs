// src/core/persistence/mod.rs

//! This module contains everything that moves aggregated statistics out of
//! memory: the transactional persistence sink and the append-only stats log.

pub mod sink;
pub mod stats_log;

// Re-export the primary public types from the sub-modules.
pub use sink::{
    CatalogSink, DatabaseMetricRow, IndexMetricRow, JsonLinesSink, MetricsBatch, NullSink,
    PersistenceSink, QueryMetricRow, TableMetricRow,
};
pub use stats_log::StatsLog;
