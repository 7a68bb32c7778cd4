// src/server/mod.rs

use crate::config::Config;
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

mod context;
mod initialization;
mod metrics_server;
mod spawner;
pub mod workload;

pub use context::ServerContext;

/// How long background tasks get to exit after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The main startup function, orchestrating all setup phases, then waiting
/// for a termination signal and shutting everything down in order.
pub async fn run(config: Config, workers: u64) -> Result<()> {
    // 1. Initialize the engine and start the aggregation task.
    let mut ctx = initialization::setup(config).await?;

    // 2. Spawn the remaining background tasks.
    spawner::spawn_all(&mut ctx, workers)?;

    // 3. Wait for a signal or a failing background task.
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            }
        }
    }

    // 4. Stop workers first so their final counters land in the retired history,
    // then stop the aggregator.
    if ctx.shutdown_tx.send(()).is_err() {
        warn!("No background task was listening for the shutdown signal.");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Background tasks did not exit within {:?}.", SHUTDOWN_GRACE);
    }

    ctx.engine.stop().await;
    info!("Shutdown complete.");
    Ok(())
}
