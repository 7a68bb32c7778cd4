// src/core/stats/throughput.rs

//! Instantaneous, lifetime and exponentially weighted commit throughput.

use crate::core::metrics;
use std::time::Duration;
use tracing::warn;

/// The default weight given to the most recent interval by the moving average.
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
enum EstimatorState {
    /// No cycle has been observed yet.
    Cold,
    Warm { weighted_avg: f64 },
}

/// The throughput figures derived from one cycle, in transactions per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// 1-based index of the cycle.
    pub cycle: u64,
    /// Cumulative committed transactions observed this cycle.
    pub committed: u64,
    /// Commits since the previous cycle, clamped at zero.
    pub delta: u64,
    pub instant: f64,
    pub lifetime_avg: f64,
    pub weighted_avg: f64,
}

/// Tracks commit throughput across aggregation cycles.
///
/// Only the aggregation task drives an estimator.
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    interval: Duration,
    alpha: f64,
    cycles: u64,
    previous_committed: u64,
    anomalies: u64,
    state: EstimatorState,
}

impl ThroughputEstimator {
    /// Creates a cold estimator for cycles `interval` apart, smoothing with `alpha`.
    pub fn new(interval: Duration, alpha: f64) -> Self {
        Self {
            interval,
            alpha,
            cycles: 0,
            previous_committed: 0,
            anomalies: 0,
            state: EstimatorState::Cold,
        }
    }

    /// Feeds the cumulative committed count of a new cycle.
    ///
    /// A count lower than the previous cycle's is an anomaly (a counter reset
    /// or a lost contribution): the delta is clamped at zero and a warning is
    /// logged. The new count becomes the baseline either way.
    pub fn observe(&mut self, current_committed: u64) -> ThroughputSample {
        self.cycles += 1;

        let delta = match current_committed.checked_sub(self.previous_committed) {
            Some(delta) => delta,
            None => {
                self.anomalies += 1;
                metrics::COUNTER_ANOMALIES_TOTAL.inc();
                warn!(
                    "Committed transaction count went backwards ({} -> {}) at cycle {}. Treating the interval as idle.",
                    self.previous_committed, current_committed, self.cycles
                );
                0
            }
        };

        let secs = self.interval.as_secs_f64();
        let instant = delta as f64 / secs;
        let lifetime_avg = current_committed as f64 / (self.cycles as f64 * secs);

        let weighted_avg = match self.state {
            EstimatorState::Cold => instant,
            EstimatorState::Warm { weighted_avg } => {
                self.alpha * instant + (1.0 - self.alpha) * weighted_avg
            }
        };
        self.state = EstimatorState::Warm { weighted_avg };
        self.previous_committed = current_committed;

        ThroughputSample {
            cycle: self.cycles,
            committed: current_committed,
            delta,
            instant,
            lifetime_avg,
            weighted_avg,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_warm(&self) -> bool {
        matches!(self.state, EstimatorState::Warm { .. })
    }

    /// The current moving average, or `None` before the first cycle.
    pub fn weighted_avg(&self) -> Option<f64> {
        match self.state {
            EstimatorState::Cold => None,
            EstimatorState::Warm { weighted_avg } => Some(weighted_avg),
        }
    }

    pub fn previous_committed(&self) -> u64 {
        self.previous_committed
    }

    /// How many cycles observed a decreasing committed count.
    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
