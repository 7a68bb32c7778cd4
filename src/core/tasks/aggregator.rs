// src/core/tasks/aggregator.rs

//! The background task that periodically merges every worker's statistics,
//! updates the throughput estimate and commits the result to the sink.

use crate::config::StatsConfig;
use crate::core::StatsError;
use crate::core::metrics;
use crate::core::persistence::{MetricsBatch, PersistenceSink, StatsLog};
use crate::core::stats::{
    AggregateAccumulator, CATALOG_DATABASE_OID, Registry, StatsGuard, StatsSnapshot, StatsTotals,
    ThroughputEstimator, ThroughputSample, WorkerId, WorkerIdentity,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant as StdInstant;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// The lifecycle of the aggregation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Why the aggregation task woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// The aggregation interval elapsed.
    Timeout,
    /// `stop` was called, or the shutdown channel closed.
    Shutdown,
}

/// Waits for the next tick or for a shutdown signal, whichever comes first.
/// A pending shutdown always wins over a ready tick.
pub async fn wait_for_wake(
    interval: &mut Interval,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> WakeReason {
    tokio::select! {
        biased;
        _ = shutdown_rx.recv() => WakeReason::Shutdown,
        _ = interval.tick() => WakeReason::Timeout,
    }
}

/// What one aggregation cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sample: ThroughputSample,
    /// The merged counters: retired history plus every live worker except the aggregator.
    pub totals: StatsTotals,
    pub merged_snapshots: usize,
    /// Completed queries handed to the sink this cycle.
    pub queries: usize,
    /// `None` if the sink committed the batch.
    pub sink_error: Option<StatsError>,
    /// Whether the stats log received an entry this cycle.
    pub logged: bool,
}

impl CycleReport {
    pub fn committed(&self) -> bool {
        self.sink_error.is_none()
    }
}

/// State owned by whichever caller is running a cycle.
#[derive(Debug)]
struct CycleState {
    accumulator: AggregateAccumulator,
    estimator: ThroughputEstimator,
    stats_log: StatsLog,
    last_sample: Option<ThroughputSample>,
}

#[derive(Debug)]
struct SchedulerSlot {
    state: SchedulerState,
    shutdown_tx: Option<broadcast::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// The statistics aggregation engine.
///
/// Constructed once and shared as an `Arc` with whatever needs to register
/// workers. Owns the registry, the throughput estimator and the background
/// task that drives the cycle.
pub struct StatsAggregator {
    config: StatsConfig,
    registry: Arc<Registry>,
    sink: Arc<dyn PersistenceSink>,
    /// The aggregator's own bookkeeping, registered as `WorkerIdentity::Aggregator`.
    own_stats: Arc<StatsSnapshot>,
    cycle: AsyncMutex<CycleState>,
    scheduler: Mutex<SchedulerSlot>,
    sink_failures: AtomicU64,
}

impl StatsAggregator {
    /// Creates an idle engine and opens the stats log if logging is enabled.
    pub async fn new(
        config: StatsConfig,
        registry: Arc<Registry>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Arc<Self> {
        let stats_log = if config.log_every_n_cycles > 0 {
            StatsLog::open(&config.log_path).await
        } else {
            StatsLog::disabled()
        };

        let cycle = CycleState {
            accumulator: AggregateAccumulator::new(config.latency_history_len),
            estimator: ThroughputEstimator::new(
                config.aggregation_interval(),
                config.smoothing_factor,
            ),
            stats_log,
            last_sample: None,
        };

        Arc::new(Self {
            config,
            registry,
            sink,
            own_stats: Arc::new(StatsSnapshot::new()),
            cycle: AsyncMutex::new(cycle),
            scheduler: Mutex::new(SchedulerSlot {
                state: SchedulerState::Idle,
                shutdown_tx: None,
                handle: None,
            }),
            sink_failures: AtomicU64::new(0),
        })
    }

    /// Spawns the aggregation task. Must be called from within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), StatsError> {
        let mut slot = self.scheduler.lock();
        if slot.state != SchedulerState::Idle {
            return Err(StatsError::InvalidState(format!(
                "stats aggregator cannot start from {:?}",
                slot.state
            )));
        }

        self.registry
            .register(WorkerIdentity::Aggregator, Arc::clone(&self.own_stats));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let engine = Arc::clone(self);
        slot.handle = Some(tokio::spawn(async move {
            engine.run(shutdown_rx).await;
        }));
        slot.shutdown_tx = Some(shutdown_tx);
        slot.state = SchedulerState::Running;
        Ok(())
    }

    /// Signals the aggregation task and waits for it to exit. A cycle already
    /// in flight completes first. Calling `stop` on an engine that is not
    /// running is a no-op.
    pub async fn stop(&self) {
        let (shutdown_tx, handle) = {
            let mut slot = self.scheduler.lock();
            if slot.state != SchedulerState::Running {
                debug!("Stats aggregator stop requested in state {:?}; nothing to do.", slot.state);
                return;
            }
            slot.state = SchedulerState::Stopping;
            (slot.shutdown_tx.take(), slot.handle.take())
        };

        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }
        debug!("Notified stats aggregator task, waiting for it to exit...");
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!("Stats aggregator task ended abnormally: {}", e);
        }

        self.registry.unregister(WorkerIdentity::Aggregator);
        if let Err(e) = self.cycle.lock().await.stats_log.close().await {
            error!("Couldn't close the stats log file: {}", e);
        }

        self.scheduler.lock().state = SchedulerState::Stopped;
        info!("Stats aggregator stopped.");
    }

    /// Runs the main loop of the aggregation task.
    async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let period = self.config.aggregation_interval();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Stats aggregator started. Interval: {:?}, smoothing factor: {}, log every {} cycles.",
            period, self.config.smoothing_factor, self.config.log_every_n_cycles
        );

        loop {
            match wait_for_wake(&mut interval, &mut shutdown_rx).await {
                WakeReason::Timeout => {
                    if self.state() != SchedulerState::Running {
                        break;
                    }
                    self.run_cycle().await;
                }
                WakeReason::Shutdown => break,
            }
        }
        info!("Stats aggregator task shutting down.");
    }

    /// Runs exactly one aggregation cycle: merge, throughput update, sink
    /// commit and, every `log_every_n_cycles` cycles, a stats log entry.
    ///
    /// Failures are logged and reported; they never abort the engine.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = StdInstant::now();
        let mut cycle = self.cycle.lock().await;
        let CycleState {
            accumulator,
            estimator,
            stats_log,
            last_sample,
        } = &mut *cycle;

        accumulator.reset();
        let view = self.registry.snapshot_view();
        for (identity, snapshot) in &view.live {
            if *identity == WorkerIdentity::Aggregator {
                continue;
            }
            accumulator.merge_snapshot(snapshot);
        }
        accumulator.merge_retired(view.retired);
        metrics::LIVE_WORKERS.set(accumulator.merged_snapshots() as f64);
        trace!("{}", accumulator);

        let sample = estimator.observe(accumulator.total_txn_committed());
        trace!(
            "Cycle {}: current throughput {:.2} txn/s, average {:.2} txn/s, moving average {:.2} txn/s",
            sample.cycle, sample.instant, sample.lifetime_avg, sample.weighted_avg
        );
        metrics::THROUGHPUT_INSTANT.set(sample.instant);
        metrics::THROUGHPUT_LIFETIME_AVG.set(sample.lifetime_avg);
        metrics::THROUGHPUT_WEIGHTED_AVG.set(sample.weighted_avg);
        metrics::TXN_COMMITTED.set(sample.committed as f64);

        let batch = MetricsBatch::from_aggregate(accumulator, chrono::Utc::now().timestamp());
        let sink_error = match self.sink.commit(&batch).await {
            Ok(()) => {
                self.own_stats.record_commit(CATALOG_DATABASE_OID);
                None
            }
            Err(e) => {
                self.own_stats.record_abort(CATALOG_DATABASE_OID);
                self.sink_failures.fetch_add(1, Ordering::Relaxed);
                metrics::SINK_FAILURES_TOTAL.inc();
                metrics::QUERIES_LOST_TOTAL.inc_by(batch.queries.len() as f64);
                error!(
                    "Failed to commit stats for cycle {}: {}. {} completed queries were dropped.",
                    sample.cycle,
                    e,
                    batch.queries.len()
                );
                Some(e)
            }
        };

        let mut logged = false;
        let every = self.config.log_every_n_cycles;
        if every > 0 && sample.cycle % every == 0 {
            match stats_log.append(accumulator, &sample).await {
                Ok(()) => logged = true,
                Err(StatsError::LogUnavailable(_)) => {
                    warn!("Stats log unavailable, skipping entry for cycle {}.", sample.cycle)
                }
                Err(e) => error!("Error when writing to the stats log file: {}", e),
            }
        }

        *last_sample = Some(sample);
        metrics::CYCLES_TOTAL.inc();
        metrics::CYCLE_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        CycleReport {
            sample,
            totals: accumulator.totals().clone(),
            merged_snapshots: accumulator.merged_snapshots(),
            queries: batch.queries.len(),
            sink_error,
            logged,
        }
    }

    /// Registers a worker with a fresh snapshot that is unregistered when the guard drops.
    /// The snapshot's query queue is bounded by `query_queue_capacity`.
    ///
    /// # Panics
    ///
    /// Panics if the worker is already registered.
    pub fn register_worker(&self, id: WorkerId) -> StatsGuard {
        StatsGuard::register_with(
            Arc::clone(&self.registry),
            WorkerIdentity::Worker(id),
            Arc::new(StatsSnapshot::with_query_capacity(
                self.config.query_queue_capacity,
            )),
        )
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.lock().state
    }

    /// The aggregator's own bookkeeping counters.
    pub fn own_stats(&self) -> &StatsSnapshot {
        &self.own_stats
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    /// The throughput figures of the most recent cycle.
    pub async fn last_sample(&self) -> Option<ThroughputSample> {
        self.cycle.lock().await.last_sample
    }
}
