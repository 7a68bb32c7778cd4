// src/config.rs

//! Manages engine configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

use crate::core::stats::accumulator::LATENCY_HISTORY_AGGREGATE;
use crate::core::stats::snapshot::DEFAULT_QUERY_QUEUE_CAPACITY;
use crate::core::stats::throughput::DEFAULT_SMOOTHING_FACTOR;

/// Settings for the aggregation cycle, the throughput estimator and the stats log.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StatsConfig {
    /// The period between aggregation cycles, in milliseconds.
    #[serde(default = "default_aggregation_interval_ms")]
    pub aggregation_interval_ms: u64,
    /// The weight of the latest interval in the moving-average throughput, in `(0, 1]`.
    #[serde(default = "default_smoothing_factor")]
    pub smoothing_factor: f64,
    /// A full dump is appended to the stats log every this many cycles. `0` disables the log.
    #[serde(default = "default_log_every_n_cycles")]
    pub log_every_n_cycles: u64,
    /// The path of the append-only stats log.
    #[serde(default = "default_stats_log_path")]
    pub log_path: String,
    /// The number of transaction latency samples the aggregate keeps.
    #[serde(default = "default_latency_history_len")]
    pub latency_history_len: usize,
    /// The bound on each worker's queue of completed queries.
    #[serde(default = "default_query_queue_capacity")]
    pub query_queue_capacity: usize,
}

impl StatsConfig {
    pub fn aggregation_interval(&self) -> Duration {
        Duration::from_millis(self.aggregation_interval_ms)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            aggregation_interval_ms: default_aggregation_interval_ms(),
            smoothing_factor: default_smoothing_factor(),
            log_every_n_cycles: default_log_every_n_cycles(),
            log_path: default_stats_log_path(),
            latency_history_len: default_latency_history_len(),
            query_queue_capacity: default_query_queue_capacity(),
        }
    }
}

fn default_aggregation_interval_ms() -> u64 {
    1000
}
fn default_smoothing_factor() -> f64 {
    DEFAULT_SMOOTHING_FACTOR
}
fn default_log_every_n_cycles() -> u64 {
    10
}
fn default_stats_log_path() -> String {
    "txnstats_data/stats.log".to_string()
}
fn default_latency_history_len() -> usize {
    LATENCY_HISTORY_AGGREGATE
}
fn default_query_queue_capacity() -> usize {
    DEFAULT_QUERY_QUEUE_CAPACITY
}

/// The kind of persistence sink aggregated rows are committed to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// In-memory metric tables.
    #[default]
    Catalog,
    /// One JSON line per cycle appended to `sink.path`.
    Jsonl,
    /// Discard every batch.
    None,
}

/// Configuration for the persistence sink.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    #[serde(default = "default_sink_path")]
    pub path: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            path: default_sink_path(),
        }
    }
}

fn default_sink_path() -> String {
    "txnstats_data/metrics.jsonl".to_string()
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8879
}

/// Represents the final, validated engine configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stats: StatsConfig::default(),
            sink: SinkConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.stats.aggregation_interval_ms == 0 {
            return Err(anyhow!("stats.aggregation_interval_ms cannot be 0"));
        }
        let alpha = self.stats.smoothing_factor;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(anyhow!(
                "stats.smoothing_factor must be in (0, 1], got {}",
                alpha
            ));
        }
        if self.stats.query_queue_capacity == 0 {
            return Err(anyhow!("stats.query_queue_capacity cannot be 0"));
        }
        if self.stats.log_every_n_cycles > 0 && self.stats.log_path.trim().is_empty() {
            return Err(anyhow!(
                "stats.log_path cannot be empty when stats.log_every_n_cycles is set"
            ));
        }
        if self.stats.latency_history_len == 0 {
            warn!("stats.latency_history_len is 0. Latency summaries will be empty.");
        }

        if self.sink.kind == SinkKind::Jsonl && self.sink.path.trim().is_empty() {
            return Err(anyhow!("sink.path cannot be empty when sink.kind is 'jsonl'"));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(anyhow!("metrics.port cannot be 0"));
        }
        Ok(())
    }
}
