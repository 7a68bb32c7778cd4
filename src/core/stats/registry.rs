// src/core/stats/registry.rs

//! The concurrent map from worker identity to live snapshot.

use super::snapshot::StatsSnapshot;
use super::totals::{RetiredHistory, RetiredView, StatsTotals};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A unique, process-wide identifier for a worker.
pub type WorkerId = u64;

/// Who a registered snapshot belongs to.
///
/// The aggregator records its own bookkeeping under `Aggregator`, which every
/// merge skips so that it never counts as workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkerIdentity {
    Aggregator,
    Worker(WorkerId),
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerIdentity::Aggregator => write!(f, "aggregator"),
            WorkerIdentity::Worker(id) => write!(f, "worker-{id}"),
        }
    }
}

/// A point-in-time capture of the registry for one aggregation cycle.
///
/// `live` and `retired` are taken in the same critical section, so every
/// worker appears in exactly one of them.
#[derive(Debug)]
pub struct RegistryView {
    pub live: Vec<(WorkerIdentity, Arc<StatsSnapshot>)>,
    pub retired: RetiredView,
}

#[derive(Debug, Default)]
struct RegistryInner {
    live: HashMap<WorkerIdentity, Arc<StatsSnapshot>>,
    history: RetiredHistory,
}

/// Tracks every live worker snapshot plus the retired history.
///
/// The registry holds shared handles only; the owning worker keeps its own.
/// Its lock is the sole serialization point between worker lifecycle events
/// and a running cycle, and is never held during a merge.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose retired history keeps at most `capacity`
    /// undrained queries from departed workers.
    pub fn with_query_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                live: HashMap::new(),
                history: RetiredHistory::with_query_capacity(capacity),
            }),
        }
    }

    /// Registers a worker's snapshot.
    ///
    /// # Panics
    ///
    /// Panics if `identity` is already registered. Two live registrations
    /// under one identity mean the caller lost track of a worker.
    pub fn register(&self, identity: WorkerIdentity, snapshot: Arc<StatsSnapshot>) {
        let live_count = {
            let mut inner = self.inner.lock();
            assert!(
                !inner.live.contains_key(&identity),
                "stats context for {identity} registered twice"
            );
            inner.live.insert(identity, snapshot);
            inner.live.len()
        };
        debug!("Registered stats context for {identity}. Live contexts: {live_count}");
    }

    /// Unregisters a worker, folding its cumulative counters into the retired
    /// history. Returns `false` if the identity was not registered.
    ///
    /// The fold and the removal happen under one lock, so a cycle sees the
    /// worker either live or retired.
    pub fn unregister(&self, identity: WorkerIdentity) -> bool {
        let live_count = {
            let mut inner = self.inner.lock();
            let Some(snapshot) = inner.live.remove(&identity) else {
                debug!("Stats context for {identity} already unregistered.");
                return false;
            };
            // The aggregator's own bookkeeping never becomes workload history.
            if identity != WorkerIdentity::Aggregator {
                inner.history.retire(&snapshot);
            }
            inner.live.len()
        };
        debug!("Unregistered stats context for {identity}. Live contexts: {live_count}");
        true
    }

    /// Captures the live snapshots and the retired history for one cycle.
    /// Pending retired queries move into the view.
    pub fn snapshot_view(&self) -> RegistryView {
        let mut inner = self.inner.lock();
        let live = inner
            .live
            .iter()
            .map(|(identity, snapshot)| (*identity, Arc::clone(snapshot)))
            .collect();
        RegistryView {
            live,
            retired: inner.history.take_view(),
        }
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }

    /// The number of live workers, not counting the aggregator's own snapshot.
    pub fn worker_count(&self) -> usize {
        self.inner
            .lock()
            .live
            .keys()
            .filter(|identity| **identity != WorkerIdentity::Aggregator)
            .count()
    }

    pub fn contains(&self, identity: WorkerIdentity) -> bool {
        self.inner.lock().live.contains_key(&identity)
    }

    /// A copy of the counters contributed by retired workers.
    pub fn retired_totals(&self) -> StatsTotals {
        self.inner.lock().history.totals().clone()
    }

    pub fn retired_workers(&self) -> u64 {
        self.inner.lock().history.retired_workers()
    }

    /// Queries from departed workers not yet handed to a cycle.
    pub fn retired_pending_queries(&self) -> usize {
        self.inner.lock().history.pending_query_count()
    }

    /// Queries from departed workers evicted because the history queue was full.
    pub fn retired_dropped_queries(&self) -> u64 {
        self.inner.lock().history.dropped_query_count()
    }
}

/// An RAII guard that registers a fresh snapshot for a worker and
/// unregisters it when dropped.
pub struct StatsGuard {
    registry: Arc<Registry>,
    identity: WorkerIdentity,
    snapshot: Arc<StatsSnapshot>,
}

impl StatsGuard {
    /// Registers a new snapshot for `identity`.
    ///
    /// # Panics
    ///
    /// Panics if `identity` is already registered.
    pub fn register(registry: Arc<Registry>, identity: WorkerIdentity) -> Self {
        Self::register_with(registry, identity, Arc::new(StatsSnapshot::new()))
    }

    pub fn register_with(
        registry: Arc<Registry>,
        identity: WorkerIdentity,
        snapshot: Arc<StatsSnapshot>,
    ) -> Self {
        registry.register(identity, Arc::clone(&snapshot));
        Self {
            registry,
            identity,
            snapshot,
        }
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    /// The snapshot the worker records into.
    pub fn stats(&self) -> &StatsSnapshot {
        &self.snapshot
    }
}

impl Drop for StatsGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.identity);
    }
}
