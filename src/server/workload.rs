// src/server/workload.rs

//! A synthetic workload: worker threads that record plausible transaction,
//! table, index and query activity so the aggregator has something to merge.

use crate::core::StatsAggregator;
use crate::core::stats::{ProcessorTime, QueryMetric, StatsGuard, TableAccess, WorkerId};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info};

/// The number of synthetic databases the workload spreads over.
const DATABASES: u32 = 2;
/// Tables per database.
const TABLES: u32 = 4;
/// The pause between two synthetic transactions.
const TXN_PAUSE: Duration = Duration::from_millis(2);

/// Runs one synthetic worker on the calling thread until shutdown is signalled.
/// The worker is registered for exactly the lifetime of this call.
pub fn run_worker(
    engine: Arc<StatsAggregator>,
    id: WorkerId,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let guard: StatsGuard = engine.register_worker(id);
    let stats = guard.stats();
    let mut rng = SmallRng::from_entropy();
    let mut txns = 0u64;
    debug!("Synthetic worker {} started.", id);

    loop {
        match shutdown_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        let db = 1 + rng.gen_range(0..DATABASES);
        let table = rng.gen_range(0..TABLES);
        let mut access = TableAccess::default();
        for _ in 0..rng.gen_range(1..8) {
            stats.record_table_read(db, table);
            stats.record_index_read(db, table, 0);
            access.reads += 1;
        }
        if rng.gen_bool(0.3) {
            stats.record_table_insert(db, table);
            stats.record_index_insert(db, table, 0);
            access.inserts += 1;
        }
        if rng.gen_bool(0.1) {
            stats.record_table_update(db, table);
            access.updates += 1;
        }

        let latency = Duration::from_micros(rng.gen_range(50..5_000));
        if rng.gen_bool(0.95) {
            stats.record_commit(db);
        } else {
            stats.record_abort(db);
        }
        stats.record_txn_latency(latency);

        if rng.gen_bool(0.05) {
            stats.enqueue_query(
                QueryMetric::new(format!("q{}", rng.gen_range(0..16)), db)
                    .with_access(access)
                    .with_latency(latency)
                    .with_cpu(ProcessorTime {
                        user: latency / 2,
                        system: latency / 8,
                    }),
            );
        }

        txns += 1;
        std::thread::sleep(TXN_PAUSE);
    }

    info!("Synthetic worker {} exiting after {} transactions.", id, txns);
}
