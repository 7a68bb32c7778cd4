// src/server/initialization.rs

//! Handles the engine initialization process: data directories, the
//! persistence sink, the worker registry and the aggregation task.

use super::context::ServerContext;
use crate::config::{Config, SinkKind};
use crate::core::StatsAggregator;
use crate::core::persistence::{CatalogSink, JsonLinesSink, NullSink, PersistenceSink};
use crate::core::stats::Registry;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all engine components and starts the aggregation task.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    if config.stats.log_every_n_cycles > 0 {
        ensure_parent_dir(&config.stats.log_path).await;
    }

    let sink = build_sink(&config).await?;
    let registry = Arc::new(Registry::with_query_capacity(
        config.stats.query_queue_capacity,
    ));
    let engine = StatsAggregator::new(config.stats.clone(), registry, sink).await;
    engine.start()?;
    info!("Stats aggregator initialized.");

    Ok(ServerContext {
        config,
        engine,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}

/// Creates the persistence sink selected by the configuration.
async fn build_sink(config: &Config) -> Result<Arc<dyn PersistenceSink>> {
    let sink: Arc<dyn PersistenceSink> = match config.sink.kind {
        SinkKind::Catalog => {
            info!("Committing aggregated stats to the in-memory metric catalog.");
            Arc::new(CatalogSink::new())
        }
        SinkKind::Jsonl => {
            let path = &config.sink.path;
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create sink directory for '{path}'"))?;
            }
            info!("Committing aggregated stats as JSON lines to {}", path);
            Arc::new(JsonLinesSink::new(path))
        }
        SinkKind::None => {
            warn!("Persistence sink disabled. Aggregated stats will not be stored.");
            Arc::new(NullSink)
        }
    };
    Ok(sink)
}

/// Creates the parent directory of the stats log. Failure only costs the log.
async fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        warn!(
            "Could not create stats log directory {}: {}. Continuing without a stats log.",
            parent.display(),
            e
        );
    }
}

fn log_startup_info(config: &Config) {
    info!("Starting txnstats v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Aggregation interval: {} ms, smoothing factor: {}, stats log every {} cycles at {}",
        config.stats.aggregation_interval_ms,
        config.stats.smoothing_factor,
        config.stats.log_every_n_cycles,
        config.stats.log_path
    );
}
