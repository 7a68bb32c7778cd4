// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use txnstats::config::StatsConfig;
use txnstats::core::persistence::{CatalogSink, MetricsBatch, PersistenceSink};
use txnstats::core::stats::Registry;
use txnstats::core::{StatsAggregator, StatsError};

/// Sets up minimal tracing for tests (ignores the error if already initialized).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A stats config suitable for tests: one-second interval, no stats log.
pub fn test_stats_config() -> StatsConfig {
    StatsConfig {
        aggregation_interval_ms: 1000,
        log_every_n_cycles: 0,
        ..StatsConfig::default()
    }
}

/// A sink that records batches in a catalog and can be told to fail.
#[derive(Debug, Default)]
pub struct FlakySink {
    pub catalog: CatalogSink,
    fail_next: AtomicBool,
    attempts: AtomicU64,
}

impl FlakySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail.
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceSink for FlakySink {
    async fn commit(&self, batch: &MetricsBatch) -> Result<(), StatsError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StatsError::Sink("injected transaction failure".to_string()));
        }
        self.catalog.commit(batch).await
    }
}

/// TestContext provides an engine wired to an in-memory sink.
pub struct TestContext {
    pub engine: Arc<StatsAggregator>,
    pub registry: Arc<Registry>,
    pub sink: Arc<FlakySink>,
}

impl TestContext {
    /// Creates a new test context with the default test configuration.
    pub async fn new() -> Self {
        Self::with_config(test_stats_config()).await
    }

    /// Creates a new test context with a custom stats configuration.
    pub async fn with_config(config: StatsConfig) -> Self {
        init_tracing();
        let registry = Arc::new(Registry::new());
        let sink = Arc::new(FlakySink::new());
        let engine = StatsAggregator::new(config, registry.clone(), sink.clone()).await;
        Self {
            engine,
            registry,
            sink,
        }
    }
}
