// src/server/context.rs

use crate::config::Config;
use crate::core::StatsAggregator;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the engine's main loop.
pub struct ServerContext {
    pub config: Config,
    pub engine: Arc<StatsAggregator>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
