//! Core data types shared across sources, services and the CLI

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of daily entries kept in the history series
pub const HISTORY_RETENTION_DAYS: usize = 90;

/// Largest transaction window a single marketplace fetch may examine
pub const MAX_TRANSACTION_LIMIT: u32 = 100;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum StarsRateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid transaction limit {0} (expected 1..={max})", max = MAX_TRANSACTION_LIMIT)]
    InvalidLimit(u32),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Incomplete rate (usdt_per_star <= 0): {}", .0.join("; "))]
    IncompleteRate(Vec<String>),
}

pub type Result<T> = std::result::Result<T, StarsRateError>;

/// Failure of a single source leg.
///
/// Never escapes the aggregator; it is rendered into `RatePoint::errors`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("no Stars purchases found in the last {examined} transactions")]
    NoTransactions { examined: usize },
}

/// Stars -> TON quote derived from recent Fragment purchases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceQuote {
    /// Mean TON paid per Star over the matched purchases
    pub ton_per_star: f64,
    pub transactions_count: usize,
    pub min_rate: f64,
    pub max_rate: f64,
    pub median_rate: f64,
    pub total_stars: u64,
    pub total_ton: f64,
}

/// TON -> USDT spot quote from a centralized exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeQuote {
    pub usdt_per_ton: f64,
    /// Exchange name, e.g. "binance"
    pub source: String,
    pub symbol: String,
}

/// Unprocessed per-leg payloads, attached on request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawPayloads {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_raw: Option<MarketplaceQuote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binance_raw: Option<ExchangeQuote>,
}

/// One computed Stars -> USDT observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatePoint {
    pub timestamp: DateTime<Utc>,
    pub ton_per_star: f64,
    pub usdt_per_ton: f64,
    /// `ton_per_star * usdt_per_ton`; 0 marks a failed computation
    pub usdt_per_star: f64,
    pub errors: Vec<String>,
    #[serde(flatten)]
    pub raw: Option<RawPayloads>,
}

impl RatePoint {
    /// Combine the outcome of both legs into a point.
    ///
    /// A failed leg contributes one error message and a zero rate, so the
    /// product is zero whenever either leg failed.
    pub fn from_legs(
        timestamp: DateTime<Utc>,
        marketplace: std::result::Result<MarketplaceQuote, SourceError>,
        exchange: std::result::Result<ExchangeQuote, SourceError>,
        include_raw: bool,
    ) -> Self {
        let mut errors = Vec::new();

        let marketplace = marketplace
            .map_err(|e| errors.push(format!("Fragment error: {}", e)))
            .ok();
        let exchange = exchange
            .map_err(|e| errors.push(format!("Binance error: {}", e)))
            .ok();

        let ton_per_star = marketplace.as_ref().map_or(0.0, |q| q.ton_per_star);
        let usdt_per_ton = exchange.as_ref().map_or(0.0, |q| q.usdt_per_ton);

        let raw = include_raw.then(|| RawPayloads {
            fragment_raw: marketplace,
            binance_raw: exchange,
        });

        Self {
            timestamp,
            ton_per_star,
            usdt_per_ton,
            usdt_per_star: ton_per_star * usdt_per_ton,
            errors,
            raw,
        }
    }

    /// Calendar day (UTC) this point belongs to
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Both legs succeeded and produced a positive rate
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.usdt_per_star > 0.0
    }

    /// Number of marketplace transactions behind this point, 0 without raw data
    pub fn transactions_count(&self) -> usize {
        self.raw
            .as_ref()
            .and_then(|r| r.fragment_raw.as_ref())
            .map_or(0, |q| q.transactions_count)
    }

    /// Exchange name from the raw payload, if one was attached
    pub fn exchange_source(&self) -> Option<&str> {
        self.raw
            .as_ref()
            .and_then(|r| r.binance_raw.as_ref())
            .map(|q| q.source.as_str())
    }
}

/// Persisted daily record; `date` is the natural key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub timestamp: String,
    pub usdt_per_star: f64,
    pub ton_per_star: f64,
    pub usdt_per_ton: f64,
}

impl HistoryEntry {
    /// Rounded snapshot of a point (6, 6 and 3 decimals)
    pub fn from_point(point: &RatePoint) -> Self {
        Self {
            date: point.date(),
            timestamp: point.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            usdt_per_star: round_to(point.usdt_per_star, 6),
            ton_per_star: round_to(point.ton_per_star, 6),
            usdt_per_ton: round_to(point.usdt_per_ton, 3),
        }
    }
}

/// Round to a fixed number of decimal digits
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
