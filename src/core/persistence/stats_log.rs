// src/core/persistence/stats_log.rs

//! The human-readable, append-only stats log.
//!
//! Every few cycles the aggregator appends the full aggregate dump plus the
//! throughput figures. The log is best effort: if the file cannot be opened
//! the engine keeps running without it.

use crate::core::StatsError;
use crate::core::stats::{AggregateAccumulator, ThroughputSample};
use std::path::{Path, PathBuf};
use tokio::fs::{File as TokioFile, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{error, info};

#[derive(Debug)]
pub struct StatsLog {
    path: PathBuf,
    writer: Option<BufWriter<TokioFile>>,
}

impl StatsLog {
    /// Opens (or creates) the log for appending. An open failure is logged and
    /// yields a log whose appends report `LogUnavailable`.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let writer = match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                info!("Stats log opened at {}", path.display());
                Some(BufWriter::new(file))
            }
            Err(e) => {
                error!("Couldn't open the stats log file {}: {}", path.display(), e);
                None
            }
        };
        Self { path, writer }
    }

    /// A log that never writes anything.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            writer: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry for `sample.cycle` and flushes it.
    pub async fn append(
        &mut self,
        aggregate: &AggregateAccumulator,
        sample: &ThroughputSample,
    ) -> Result<(), StatsError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(StatsError::LogUnavailable(self.path.display().to_string()));
        };

        let entry = format_entry(aggregate, sample);
        writer.write_all(entry.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Flushes and closes the file. Further appends report `LogUnavailable`.
    pub async fn close(&mut self) -> Result<(), StatsError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }
        Ok(())
    }
}

fn format_entry(aggregate: &AggregateAccumulator, sample: &ThroughputSample) -> String {
    format!(
        "At interval: {}\n{}Weighted avg. throughput={}\nAverage throughput={}\nCurrent throughput={}\n",
        sample.cycle, aggregate, sample.weighted_avg, sample.lifetime_avg, sample.instant
    )
}
