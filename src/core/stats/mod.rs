// src/core/stats/mod.rs

//! Per-worker statistics, their registry, and the structures an aggregation
//! cycle merges them into.

pub mod accumulator;
pub mod metric;
pub mod registry;
pub mod snapshot;
pub mod throughput;
pub mod totals;

pub use accumulator::{AggregateAccumulator, LatencySummary};
pub use metric::{
    CATALOG_DATABASE_OID, DatabaseCounters, IndexAccess, Oid, ProcessorTime, QueryMetric,
    QueryParams, TableAccess,
};
pub use registry::{Registry, RegistryView, StatsGuard, WorkerId, WorkerIdentity};
pub use snapshot::StatsSnapshot;
pub use throughput::{ThroughputEstimator, ThroughputSample};
pub use totals::{RetiredHistory, RetiredView, StatsTotals};
