// src/core/tasks/mod.rs

//! This module contains the long-running background tasks of the engine.

pub mod aggregator;

pub use aggregator::{CycleReport, SchedulerState, StatsAggregator, WakeReason};
