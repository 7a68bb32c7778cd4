// src/core/stats/snapshot.rs

//! Contains the per-worker counter bundle that the aggregator merges.

use super::metric::{
    DatabaseCounters, IndexAccess, IndexKey, Oid, QueryMetric, TableAccess, TableKey,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The number of transaction latency samples a single worker keeps.
pub const LATENCY_HISTORY_PER_WORKER: usize = 100;

/// The default bound on completed queries waiting for the next cycle.
pub const DEFAULT_QUERY_QUEUE_CAPACITY: usize = 100_000;

#[derive(Debug, Default)]
struct AtomicDatabaseCounters {
    txn_committed: AtomicU64,
    txn_aborted: AtomicU64,
}

#[derive(Debug, Default)]
struct AtomicTableAccess {
    reads: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    inserts: AtomicU64,
}

#[derive(Debug, Default)]
struct AtomicIndexAccess {
    reads: AtomicU64,
    deletes: AtomicU64,
    inserts: AtomicU64,
}

/// A worker's cumulative activity counters.
///
/// Only the owning worker records into a snapshot. The aggregator reads the
/// counters concurrently with `Relaxed` loads, so a merge may observe a counter
/// mid-update but never a decrease.
#[derive(Debug)]
pub struct StatsSnapshot {
    databases: DashMap<Oid, AtomicDatabaseCounters>,
    tables: DashMap<TableKey, AtomicTableAccess>,
    indexes: DashMap<IndexKey, AtomicIndexAccess>,
    completed_queries: Mutex<VecDeque<QueryMetric>>,
    query_queue_capacity: usize,
    dropped_queries: AtomicU64,
    txn_latencies: Mutex<VecDeque<Duration>>,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    /// Creates an empty snapshot with the default query queue bound.
    pub fn new() -> Self {
        Self::with_query_capacity(DEFAULT_QUERY_QUEUE_CAPACITY)
    }

    /// Creates an empty snapshot whose completed-query queue holds at most `capacity` records.
    pub fn with_query_capacity(capacity: usize) -> Self {
        Self {
            databases: DashMap::new(),
            tables: DashMap::new(),
            indexes: DashMap::new(),
            completed_queries: Mutex::new(VecDeque::new()),
            query_queue_capacity: capacity.max(1),
            dropped_queries: AtomicU64::new(0),
            txn_latencies: Mutex::new(VecDeque::with_capacity(LATENCY_HISTORY_PER_WORKER)),
        }
    }

    // --- Recording (owning worker only) ---

    pub fn record_commit(&self, database_oid: Oid) {
        self.databases
            .entry(database_oid)
            .or_default()
            .txn_committed
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abort(&self, database_oid: Oid) {
        self.databases
            .entry(database_oid)
            .or_default()
            .txn_aborted
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_table_read(&self, database_oid: Oid, table_oid: Oid) {
        self.table_entry(database_oid, table_oid, |t| &t.reads);
    }

    pub fn record_table_update(&self, database_oid: Oid, table_oid: Oid) {
        self.table_entry(database_oid, table_oid, |t| &t.updates);
    }

    pub fn record_table_delete(&self, database_oid: Oid, table_oid: Oid) {
        self.table_entry(database_oid, table_oid, |t| &t.deletes);
    }

    pub fn record_table_insert(&self, database_oid: Oid, table_oid: Oid) {
        self.table_entry(database_oid, table_oid, |t| &t.inserts);
    }

    pub fn record_index_read(&self, database_oid: Oid, table_oid: Oid, index_oid: Oid) {
        self.index_entry((database_oid, table_oid, index_oid), |i| &i.reads);
    }

    pub fn record_index_delete(&self, database_oid: Oid, table_oid: Oid, index_oid: Oid) {
        self.index_entry((database_oid, table_oid, index_oid), |i| &i.deletes);
    }

    pub fn record_index_insert(&self, database_oid: Oid, table_oid: Oid, index_oid: Oid) {
        self.index_entry((database_oid, table_oid, index_oid), |i| &i.inserts);
    }

    /// Records the latency of a finished transaction, evicting the oldest sample when full.
    pub fn record_txn_latency(&self, latency: Duration) {
        let mut latencies = self.txn_latencies.lock();
        if latencies.len() == LATENCY_HISTORY_PER_WORKER {
            latencies.pop_front();
        }
        latencies.push_back(latency);
    }

    /// Queues a completed query for the next aggregation cycle.
    /// If the queue is full, the oldest record is dropped.
    pub fn enqueue_query(&self, query: QueryMetric) {
        let mut queue = self.completed_queries.lock();
        if queue.len() == self.query_queue_capacity {
            queue.pop_front();
            self.dropped_queries.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(query);
    }

    fn table_entry(
        &self,
        database_oid: Oid,
        table_oid: Oid,
        field: impl Fn(&AtomicTableAccess) -> &AtomicU64,
    ) {
        let entry = self.tables.entry((database_oid, table_oid)).or_default();
        field(&*entry).fetch_add(1, Ordering::Relaxed);
    }

    fn index_entry(&self, key: IndexKey, field: impl Fn(&AtomicIndexAccess) -> &AtomicU64) {
        let entry = self.indexes.entry(key).or_default();
        field(&*entry).fetch_add(1, Ordering::Relaxed);
    }

    // --- Read side (aggregator) ---

    /// Removes and returns every queued query. Atomic with respect to `enqueue_query`.
    pub fn drain_completed_queries(&self) -> Vec<QueryMetric> {
        self.completed_queries.lock().drain(..).collect()
    }

    pub fn pending_query_count(&self) -> usize {
        self.completed_queries.lock().len()
    }

    /// The number of queries evicted because the queue was full.
    pub fn dropped_query_count(&self) -> u64 {
        self.dropped_queries.load(Ordering::Relaxed)
    }

    pub fn txn_committed(&self, database_oid: Oid) -> u64 {
        self.database_counters(database_oid).txn_committed
    }

    pub fn txn_aborted(&self, database_oid: Oid) -> u64 {
        self.database_counters(database_oid).txn_aborted
    }

    pub fn database_counters(&self, database_oid: Oid) -> DatabaseCounters {
        self.databases
            .get(&database_oid)
            .map(|c| load_database(&c))
            .unwrap_or_default()
    }

    /// Calls `f` with a point-in-time copy of every per-database counter.
    pub fn for_each_database(&self, mut f: impl FnMut(Oid, DatabaseCounters)) {
        for entry in self.databases.iter() {
            f(*entry.key(), load_database(entry.value()));
        }
    }

    pub fn for_each_table(&self, mut f: impl FnMut(TableKey, TableAccess)) {
        for entry in self.tables.iter() {
            let t = entry.value();
            f(
                *entry.key(),
                TableAccess {
                    reads: t.reads.load(Ordering::Relaxed),
                    updates: t.updates.load(Ordering::Relaxed),
                    deletes: t.deletes.load(Ordering::Relaxed),
                    inserts: t.inserts.load(Ordering::Relaxed),
                },
            );
        }
    }

    pub fn for_each_index(&self, mut f: impl FnMut(IndexKey, IndexAccess)) {
        for entry in self.indexes.iter() {
            let i = entry.value();
            f(
                *entry.key(),
                IndexAccess {
                    reads: i.reads.load(Ordering::Relaxed),
                    deletes: i.deletes.load(Ordering::Relaxed),
                    inserts: i.inserts.load(Ordering::Relaxed),
                },
            );
        }
    }

    /// Returns a copy of the latency samples, oldest first.
    pub fn txn_latencies(&self) -> Vec<Duration> {
        self.txn_latencies.lock().iter().copied().collect()
    }
}

fn load_database(c: &AtomicDatabaseCounters) -> DatabaseCounters {
    DatabaseCounters {
        txn_committed: c.txn_committed.load(Ordering::Relaxed),
        txn_aborted: c.txn_aborted.load(Ordering::Relaxed),
    }
}
