//! One generation run: compute, snapshot, then extend the history

use std::path::PathBuf;

use log::{error, info};

use super::aggregator::RateAggregator;
use super::history::{HistoryRepository, HistoryStore, JsonHistoryFile};
use super::snapshot::SnapshotWriter;
use crate::sources::{ExchangeSource, MarketplaceSource};
use crate::types::{RatePoint, Result, StarsRateError};

pub const DEFAULT_OUTPUT_DIR: &str = "github_pages";
pub const DEFAULT_LIMIT: u32 = 100;

/// Settings for a generation run
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub output_dir: PathBuf,
    /// Marketplace transactions to examine
    pub limit: u32,
    /// Attach raw per-leg payloads to `rates.json`
    pub include_raw: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            limit: DEFAULT_LIMIT,
            include_raw: true,
        }
    }
}

impl GenerateOptions {
    pub fn snapshot_writer(&self) -> SnapshotWriter {
        SnapshotWriter::new(self.output_dir.clone())
    }

    pub fn history_store(&self) -> HistoryStore<JsonHistoryFile> {
        HistoryStore::new(JsonHistoryFile::in_dir(&self.output_dir))
    }
}

/// Outcome of a successful run
#[derive(Debug)]
pub struct GenerateReport {
    pub point: RatePoint,
    pub history_len: usize,
}

/// Compute a point and persist it.
///
/// Nothing is written when the rate is not positive: the run fails with
/// `StarsRateError::IncompleteRate` and the previous files stay as they were.
pub fn generate<M, E, R>(
    aggregator: &RateAggregator<M, E>,
    writer: &SnapshotWriter,
    history: &HistoryStore<R>,
    limit: u32,
    include_raw: bool,
) -> Result<GenerateReport>
where
    M: MarketplaceSource,
    E: ExchangeSource,
    R: HistoryRepository,
{
    let point = aggregator.compute(limit, include_raw)?;

    if point.usdt_per_star <= 0.0 {
        for e in &point.errors {
            error!("{}", e);
        }
        let mut errors = point.errors;
        if errors.is_empty() {
            errors.push("rate computed as zero".to_string());
        }
        return Err(StarsRateError::IncompleteRate(errors));
    }

    writer.write(&point)?;
    history.record(&point)?;
    let history_len = history.load()?.len();
    info!(
        "recorded {} (history: {} days)",
        point.date(),
        history_len
    );

    Ok(GenerateReport { point, history_len })
}
