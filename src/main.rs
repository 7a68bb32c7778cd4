// src/main.rs

//! The main entry point for the txnstats aggregation engine.

use anyhow::Result;
use std::env;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*};
use txnstats::config::Config;
use txnstats::server;

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("txnstats version {VERSION}");
        return Ok(());
    }

    // The config file is optional; without one the defaults apply.
    let config = match args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
    {
        Some(config_path) => match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    // Number of synthetic worker threads to run alongside the aggregator.
    let workers = match args.iter().position(|arg| arg == "--workers") {
        Some(i) => match args.get(i + 1).map(|s| s.parse::<u64>()) {
            Some(Ok(n)) => n,
            Some(Err(_)) | None => {
                eprintln!("--workers flag requires a non-negative integer");
                std::process::exit(1);
            }
        },
        None => 0,
    };

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    if let Err(e) = server::run(config, workers).await {
        error!("Runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
