// src/core/stats/metric.rs

//! Plain value types shared by snapshots, totals and the aggregate.

use bytes::Bytes;
use serde::Serialize;
use std::time::Duration;

/// An object identifier for a database, table or index.
pub type Oid = u32;

/// The oid of the catalog database, where the engine's own bookkeeping lands.
pub const CATALOG_DATABASE_OID: Oid = 0;

/// Identifies a table within a database.
pub type TableKey = (Oid, Oid);

/// Identifies an index within a table within a database.
pub type IndexKey = (Oid, Oid, Oid);

/// Transaction outcome counters for a single database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseCounters {
    pub txn_committed: u64,
    pub txn_aborted: u64,
}

impl DatabaseCounters {
    pub fn absorb(&mut self, other: &DatabaseCounters) {
        self.txn_committed = self.txn_committed.saturating_add(other.txn_committed);
        self.txn_aborted = self.txn_aborted.saturating_add(other.txn_aborted);
    }
}

/// Tuple access counters for a table, or for the tables touched by one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableAccess {
    pub reads: u64,
    pub updates: u64,
    pub deletes: u64,
    pub inserts: u64,
}

impl TableAccess {
    pub fn absorb(&mut self, other: &TableAccess) {
        self.reads = self.reads.saturating_add(other.reads);
        self.updates = self.updates.saturating_add(other.updates);
        self.deletes = self.deletes.saturating_add(other.deletes);
        self.inserts = self.inserts.saturating_add(other.inserts);
    }
}

/// Access counters for an index. Indexes are never updated in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexAccess {
    pub reads: u64,
    pub deletes: u64,
    pub inserts: u64,
}

impl IndexAccess {
    pub fn absorb(&mut self, other: &IndexAccess) {
        self.reads = self.reads.saturating_add(other.reads);
        self.deletes = self.deletes.saturating_add(other.deletes);
        self.inserts = self.inserts.saturating_add(other.inserts);
    }
}

/// CPU time spent executing a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorTime {
    pub user: Duration,
    pub system: Duration,
}

impl ProcessorTime {
    pub fn total(&self) -> Duration {
        self.user + self.system
    }
}

/// Copies of the parameter buffers a prepared query was bound with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pub num_params: usize,
    pub type_buf: Bytes,
    pub format_buf: Bytes,
    pub value_buf: Bytes,
}

/// A record describing one completed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMetric {
    pub name: String,
    pub database_oid: Oid,
    pub params: Option<QueryParams>,
    pub access: TableAccess,
    pub latency: Duration,
    pub cpu: ProcessorTime,
}

impl QueryMetric {
    /// Creates a record with no bound parameters and zeroed measurements.
    pub fn new(name: impl Into<String>, database_oid: Oid) -> Self {
        Self {
            name: name.into(),
            database_oid,
            params: None,
            access: TableAccess::default(),
            latency: Duration::ZERO,
            cpu: ProcessorTime::default(),
        }
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_access(mut self, access: TableAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_cpu(mut self, cpu: ProcessorTime) -> Self {
        self.cpu = cpu;
        self
    }
}
