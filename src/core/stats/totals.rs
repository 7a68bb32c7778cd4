// src/core/stats/totals.rs

//! Additive counter totals, and the history of workers that have retired.

use super::metric::{
    DatabaseCounters, IndexAccess, IndexKey, Oid, QueryMetric, TableAccess, TableKey,
};
use super::snapshot::{DEFAULT_QUERY_QUEUE_CAPACITY, StatsSnapshot};
use std::collections::{BTreeMap, VecDeque};

/// A plain, ordered, additive view of database, table and index counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsTotals {
    pub databases: BTreeMap<Oid, DatabaseCounters>,
    pub tables: BTreeMap<TableKey, TableAccess>,
    pub indexes: BTreeMap<IndexKey, IndexAccess>,
}

impl StatsTotals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the current counter values of a live snapshot.
    pub fn absorb_snapshot(&mut self, snapshot: &StatsSnapshot) {
        snapshot.for_each_database(|oid, counters| {
            self.databases.entry(oid).or_default().absorb(&counters);
        });
        snapshot.for_each_table(|key, access| {
            self.tables.entry(key).or_default().absorb(&access);
        });
        snapshot.for_each_index(|key, access| {
            self.indexes.entry(key).or_default().absorb(&access);
        });
    }

    /// Adds another set of totals.
    pub fn absorb(&mut self, other: &StatsTotals) {
        for (oid, counters) in &other.databases {
            self.databases.entry(*oid).or_default().absorb(counters);
        }
        for (key, access) in &other.tables {
            self.tables.entry(*key).or_default().absorb(access);
        }
        for (key, access) in &other.indexes {
            self.indexes.entry(*key).or_default().absorb(access);
        }
    }

    pub fn clear(&mut self) {
        self.databases.clear();
        self.tables.clear();
        self.indexes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty() && self.tables.is_empty() && self.indexes.is_empty()
    }

    /// Sum of committed transactions across all databases.
    pub fn txn_committed(&self) -> u64 {
        self.databases
            .values()
            .fold(0u64, |acc, c| acc.saturating_add(c.txn_committed))
    }

    pub fn txn_aborted(&self) -> u64 {
        self.databases
            .values()
            .fold(0u64, |acc, c| acc.saturating_add(c.txn_aborted))
    }
}

/// The permanent contribution of workers that have unregistered.
///
/// Created once with the engine and never reset. Mutated only while the
/// registry lock is held.
#[derive(Debug)]
pub struct RetiredHistory {
    totals: StatsTotals,
    /// Queries retired workers completed but no cycle has drained yet.
    /// Bounded like a worker's own queue; the oldest record is evicted first.
    pending_queries: VecDeque<QueryMetric>,
    query_capacity: usize,
    dropped_queries: u64,
    retired_workers: u64,
}

impl Default for RetiredHistory {
    fn default() -> Self {
        Self::with_query_capacity(DEFAULT_QUERY_QUEUE_CAPACITY)
    }
}

/// What one aggregation cycle takes from the retired history.
#[derive(Debug, Default, Clone)]
pub struct RetiredView {
    pub totals: StatsTotals,
    pub pending_queries: Vec<QueryMetric>,
}

impl RetiredHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty history holding at most `capacity` pending queries.
    pub fn with_query_capacity(capacity: usize) -> Self {
        Self {
            totals: StatsTotals::new(),
            pending_queries: VecDeque::new(),
            query_capacity: capacity.max(1),
            dropped_queries: 0,
            retired_workers: 0,
        }
    }

    /// Folds a departing worker's cumulative counters and any undrained queries.
    pub fn retire(&mut self, snapshot: &StatsSnapshot) {
        self.totals.absorb_snapshot(snapshot);
        for query in snapshot.drain_completed_queries() {
            if self.pending_queries.len() == self.query_capacity {
                self.pending_queries.pop_front();
                self.dropped_queries += 1;
            }
            self.pending_queries.push_back(query);
        }
        self.retired_workers += 1;
    }

    /// Copies the totals and hands over the pending queries, which are drained exactly once.
    pub fn take_view(&mut self) -> RetiredView {
        RetiredView {
            totals: self.totals.clone(),
            pending_queries: self.pending_queries.drain(..).collect(),
        }
    }

    pub fn totals(&self) -> &StatsTotals {
        &self.totals
    }

    pub fn pending_query_count(&self) -> usize {
        self.pending_queries.len()
    }

    /// The number of retired queries evicted because the history queue was full.
    pub fn dropped_query_count(&self) -> u64 {
        self.dropped_queries
    }

    pub fn retired_workers(&self) -> u64 {
        self.retired_workers
    }
}
