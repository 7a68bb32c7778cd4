// src/core/stats/accumulator.rs

//! The per-cycle reduction target that merges live snapshots and retired history.

use super::metric::{DatabaseCounters, IndexAccess, Oid, QueryMetric, TableAccess};
use super::snapshot::StatsSnapshot;
use super::totals::{RetiredView, StatsTotals};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::time::Duration;

/// The default number of transaction latency samples kept by the aggregate.
pub const LATENCY_HISTORY_AGGREGATE: usize = 10_000;

/// Summary statistics over the aggregate's latency samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub samples: usize,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p99: Duration,
}

/// Scratch space for one aggregation cycle.
///
/// After a cycle it holds the merge of the retired history with every live
/// snapshot the cycle visited. Counters are summed; latency samples and
/// completed queries are appended.
#[derive(Debug)]
pub struct AggregateAccumulator {
    totals: StatsTotals,
    completed_queries: Vec<QueryMetric>,
    txn_latencies: VecDeque<Duration>,
    latency_capacity: usize,
    merged_snapshots: usize,
}

impl Default for AggregateAccumulator {
    fn default() -> Self {
        Self::new(LATENCY_HISTORY_AGGREGATE)
    }
}

impl AggregateAccumulator {
    pub fn new(latency_capacity: usize) -> Self {
        Self {
            totals: StatsTotals::new(),
            completed_queries: Vec::new(),
            txn_latencies: VecDeque::new(),
            latency_capacity,
            merged_snapshots: 0,
        }
    }

    /// Clears all state from the previous cycle.
    pub fn reset(&mut self) {
        self.totals.clear();
        self.completed_queries.clear();
        self.txn_latencies.clear();
        self.merged_snapshots = 0;
    }

    /// Folds a live snapshot: counters are summed, its query queue is drained
    /// and its latency samples are appended.
    pub fn merge_snapshot(&mut self, snapshot: &StatsSnapshot) {
        self.totals.absorb_snapshot(snapshot);
        self.completed_queries.extend(snapshot.drain_completed_queries());
        for latency in snapshot.txn_latencies() {
            self.push_latency(latency);
        }
        self.merged_snapshots += 1;
    }

    /// Folds the retired history captured for this cycle.
    pub fn merge_retired(&mut self, retired: RetiredView) {
        self.totals.absorb(&retired.totals);
        self.completed_queries.extend(retired.pending_queries);
    }

    fn push_latency(&mut self, latency: Duration) {
        if self.latency_capacity == 0 {
            return;
        }
        if self.txn_latencies.len() == self.latency_capacity {
            self.txn_latencies.pop_front();
        }
        self.txn_latencies.push_back(latency);
    }

    pub fn totals(&self) -> &StatsTotals {
        &self.totals
    }

    /// Sum of committed transactions across every database in the aggregate.
    pub fn total_txn_committed(&self) -> u64 {
        self.totals.txn_committed()
    }

    pub fn merged_snapshots(&self) -> usize {
        self.merged_snapshots
    }

    /// Counters for a database; zero if nothing touched it.
    pub fn database_metric(&self, database_oid: Oid) -> DatabaseCounters {
        self.totals
            .databases
            .get(&database_oid)
            .copied()
            .unwrap_or_default()
    }

    pub fn table_metric(&self, database_oid: Oid, table_oid: Oid) -> TableAccess {
        self.totals
            .tables
            .get(&(database_oid, table_oid))
            .copied()
            .unwrap_or_default()
    }

    pub fn index_metric(&self, database_oid: Oid, table_oid: Oid, index_oid: Oid) -> IndexAccess {
        self.totals
            .indexes
            .get(&(database_oid, table_oid, index_oid))
            .copied()
            .unwrap_or_default()
    }

    pub fn completed_queries(&self) -> &[QueryMetric] {
        &self.completed_queries
    }

    pub fn txn_latencies(&self) -> impl Iterator<Item = &Duration> {
        self.txn_latencies.iter()
    }

    /// Computes min, max, mean and percentiles over the latency samples.
    /// Returns `None` if no samples were merged.
    pub fn latency_summary(&self) -> Option<LatencySummary> {
        if self.txn_latencies.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.txn_latencies.iter().copied().collect();
        sorted.sort_unstable();

        let total: Duration = sorted.iter().sum();
        let len = sorted.len();
        Some(LatencySummary {
            samples: len,
            min: sorted[0],
            max: sorted[len - 1],
            mean: total / len as u32,
            p50: percentile(&sorted, 50.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

/// Nearest-rank percentile over a sorted, non-empty slice.
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl fmt::Display for AggregateAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===========================================================")?;
        writeln!(f, "AGGREGATE STATS ({} snapshots merged)", self.merged_snapshots)?;
        writeln!(f, "===========================================================")?;

        match self.latency_summary() {
            Some(s) => writeln!(
                f,
                "[Txn latency] samples={} min={}us max={}us mean={}us p50={}us p99={}us",
                s.samples,
                s.min.as_micros(),
                s.max.as_micros(),
                s.mean.as_micros(),
                s.p50.as_micros(),
                s.p99.as_micros()
            )?,
            None => writeln!(f, "[Txn latency] no samples")?,
        }

        let database_oids: BTreeSet<Oid> = self
            .totals
            .databases
            .keys()
            .copied()
            .chain(self.totals.tables.keys().map(|(db, _)| *db))
            .chain(self.totals.indexes.keys().map(|(db, _, _)| *db))
            .collect();

        for db in &database_oids {
            let counters = self.database_metric(*db);
            writeln!(
                f,
                "[Database {db}] txn_committed={} txn_aborted={}",
                counters.txn_committed, counters.txn_aborted
            )?;

            // A table may have index activity without table-level counters.
            let table_oids: BTreeSet<Oid> = self
                .totals
                .tables
                .range((*db, Oid::MIN)..=(*db, Oid::MAX))
                .map(|((_, table), _)| *table)
                .chain(
                    self.totals
                        .indexes
                        .range((*db, Oid::MIN, Oid::MIN)..=(*db, Oid::MAX, Oid::MAX))
                        .map(|((_, table, _), _)| *table),
                )
                .collect();

            for table in &table_oids {
                let access = self.table_metric(*db, *table);
                writeln!(
                    f,
                    "  [Table {table}] reads={} updates={} deletes={} inserts={}",
                    access.reads, access.updates, access.deletes, access.inserts
                )?;
                let index_range = (*db, *table, Oid::MIN)..=(*db, *table, Oid::MAX);
                for ((_, _, index), access) in self.totals.indexes.range(index_range) {
                    writeln!(
                        f,
                        "    [Index {index}] reads={} deletes={} inserts={}",
                        access.reads, access.deletes, access.inserts
                    )?;
                }
            }
        }

        writeln!(f, "[Completed queries] {}", self.completed_queries.len())
    }
}
