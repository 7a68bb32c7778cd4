// src/core/metrics.rs

//! Defines and registers Prometheus metrics for the statistics engine.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of worker snapshots currently registered.
    pub static ref LIVE_WORKERS: Gauge =
        register_gauge!("txnstats_live_workers", "Number of registered worker stats contexts.").unwrap();
    /// Commit throughput over the most recent interval.
    pub static ref THROUGHPUT_INSTANT: Gauge =
        register_gauge!("txnstats_throughput_instant", "Committed transactions per second over the last interval.").unwrap();
    /// Commit throughput averaged over the engine's lifetime.
    pub static ref THROUGHPUT_LIFETIME_AVG: Gauge =
        register_gauge!("txnstats_throughput_lifetime_avg", "Committed transactions per second since startup.").unwrap();
    /// Exponentially weighted moving average of commit throughput.
    pub static ref THROUGHPUT_WEIGHTED_AVG: Gauge =
        register_gauge!("txnstats_throughput_weighted_avg", "Moving average of committed transactions per second.").unwrap();
    /// Cumulative committed transactions seen by the last cycle.
    pub static ref TXN_COMMITTED: Gauge =
        register_gauge!("txnstats_txn_committed", "Cumulative committed transactions across all databases.").unwrap();


    // --- Counters ---
    /// The total number of aggregation cycles completed.
    pub static ref CYCLES_TOTAL: Counter =
        register_counter!("txnstats_cycles_total", "Total number of aggregation cycles run.").unwrap();
    /// The total number of cycles whose sink commit failed.
    pub static ref SINK_FAILURES_TOTAL: Counter =
        register_counter!("txnstats_sink_failures_total", "Total number of failed sink commits.").unwrap();
    /// The total number of completed-query records lost to failed sink commits.
    pub static ref QUERIES_LOST_TOTAL: Counter =
        register_counter!("txnstats_queries_lost_total", "Total number of completed queries dropped with a failed sink commit.").unwrap();
    /// The total number of cycles that saw the committed count decrease.
    pub static ref COUNTER_ANOMALIES_TOTAL: Counter =
        register_counter!("txnstats_counter_anomalies_total", "Total number of cycles with a decreasing committed count.").unwrap();


    // --- Histograms ---
    /// A histogram of aggregation cycle durations.
    pub static ref CYCLE_DURATION_SECONDS: Histogram =
        register_histogram!("txnstats_cycle_duration_seconds", "Duration of an aggregation cycle in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
