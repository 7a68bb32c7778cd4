// src/core/mod.rs

//! The central module containing the core logic and data structures of the
//! statistics engine.

pub mod errors;
pub mod metrics;
pub mod persistence;
pub mod stats;
pub mod tasks;

pub use errors::StatsError;
pub use tasks::StatsAggregator;
