//! Snapshot files: full rate point and public API projection

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::types::{RatePoint, Result};

pub const RATES_FILE: &str = "rates.json";
pub const API_FILE: &str = "api.json";

/// Fixed label for the marketplace the Stars price comes from
pub const SOURCE_LABEL: &str = "fragment";

/// Reduced projection served as `api.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiSnapshot {
    pub usdt_per_star: f64,
    pub ton_per_star: f64,
    pub usdt_per_ton: f64,
    pub timestamp: DateTime<Utc>,
    pub transactions_count: usize,
    pub source: &'static str,
    pub exchange_source: String,
}

impl From<&RatePoint> for ApiSnapshot {
    fn from(point: &RatePoint) -> Self {
        Self {
            usdt_per_star: point.usdt_per_star,
            ton_per_star: point.ton_per_star,
            usdt_per_ton: point.usdt_per_ton,
            timestamp: point.timestamp,
            transactions_count: point.transactions_count(),
            source: SOURCE_LABEL,
            exchange_source: point.exchange_source().unwrap_or("unknown").to_string(),
        }
    }
}

/// Writes `rates.json` and `api.json` into an output directory
pub struct SnapshotWriter {
    output_dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn rates_path(&self) -> PathBuf {
        self.output_dir.join(RATES_FILE)
    }

    pub fn api_path(&self) -> PathBuf {
        self.output_dir.join(API_FILE)
    }

    /// Write both projections, creating the directory if needed
    pub fn write(&self, point: &RatePoint) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;

        let rates_path = self.rates_path();
        fs::write(&rates_path, serde_json::to_string_pretty(point)?)?;
        info!("wrote {}", rates_path.display());

        let api_path = self.api_path();
        let api = ApiSnapshot::from(point);
        fs::write(&api_path, serde_json::to_string_pretty(&api)?)?;
        info!("wrote {}", api_path.display());

        Ok(())
    }
}
