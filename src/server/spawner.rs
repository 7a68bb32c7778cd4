// src/server/spawner.rs

//! Spawns all of the engine's long-running background tasks.

use super::context::ServerContext;
use super::{metrics_server, workload};
use anyhow::Result;
use tracing::info;

/// Spawns the metrics server and the synthetic workers into the provided JoinSet.
/// The aggregation task itself is owned by the engine.
pub fn spawn_all(ctx: &mut ServerContext, workers: u64) -> Result<()> {
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Metrics Server ---
    if ctx.config.metrics.enabled {
        let engine = ctx.engine.clone();
        let port = ctx.config.metrics.port;
        let shutdown_rx_metrics = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            metrics_server::run_metrics_server(engine, port, shutdown_rx_metrics).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    // --- Synthetic Workload ---
    for id in 1..=workers {
        let engine = ctx.engine.clone();
        let shutdown_rx_worker = shutdown_tx.subscribe();
        background_tasks.spawn_blocking(move || {
            workload::run_worker(engine, id, shutdown_rx_worker);
            Ok(())
        });
    }
    if workers > 0 {
        info!("Spawned {} synthetic worker threads.", workers);
    }

    Ok(())
}
