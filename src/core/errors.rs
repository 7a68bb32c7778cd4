// src/core/errors.rs

//! Defines the primary error type for the statistics engine.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all recoverable failures within the engine.
///
/// Invariant breaches (such as registering the same worker twice) are not
/// represented here: they panic, since they indicate a bug in the caller.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Stats log unavailable: {0}")]
    LogUnavailable(String),

    #[error("Sink Error: {0}")]
    Sink(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for StatsError {
    fn clone(&self) -> Self {
        match self {
            StatsError::Io(e) => StatsError::Io(Arc::clone(e)),
            StatsError::LogUnavailable(s) => StatsError::LogUnavailable(s.clone()),
            StatsError::Sink(s) => StatsError::Sink(s.clone()),
            StatsError::Serialization(s) => StatsError::Serialization(s.clone()),
            StatsError::InvalidState(s) => StatsError::InvalidState(s.clone()),
        }
    }
}

impl PartialEq for StatsError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StatsError::Io(a), StatsError::Io(b)) => a.kind() == b.kind(),
            (StatsError::LogUnavailable(a), StatsError::LogUnavailable(b)) => a == b,
            (StatsError::Sink(a), StatsError::Sink(b)) => a == b,
            (StatsError::Serialization(a), StatsError::Serialization(b)) => a == b,
            (StatsError::InvalidState(a), StatsError::InvalidState(b)) => a == b,
            _ => false,
        }
    }
}

impl From<std::io::Error> for StatsError {
    fn from(e: std::io::Error) -> Self {
        StatsError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(e: serde_json::Error) -> Self {
        StatsError::Serialization(e.to_string())
    }
}
