//! Upstream rate sources (one per leg)

pub mod binance;
pub mod fragment;

pub use binance::BinanceSource;
pub use fragment::FragmentSource;

use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client, RequestBuilder};

use crate::types::{ExchangeQuote, MarketplaceQuote, Result, SourceError, StarsRateError};

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Blockchain marketplace leg: Stars -> TON
pub trait MarketplaceSource {
    /// Source name used in logs
    fn name(&self) -> &str;

    /// Derive TON per Star from the most recent `limit` transactions
    fn fetch_marketplace_rate(&self, limit: u32) -> SourceResult<MarketplaceQuote>;
}

/// Exchange leg: TON -> USDT
pub trait ExchangeSource {
    /// Source name used in logs
    fn name(&self) -> &str;

    /// Current spot price of TON in USDT
    fn fetch_spot_rate(&self) -> SourceResult<ExchangeQuote>;
}

/// Endpoints and client settings for both legs
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub toncenter_url: String,
    pub toncenter_api_key: Option<String>,
    /// Fragment wallet receiving Stars purchases
    pub fragment_address: String,
    pub binance_url: String,
    pub symbol: String,
    pub timeout: Duration,
}

pub const DEFAULT_TONCENTER_URL: &str = "https://toncenter.com/api/v2";
pub const DEFAULT_FRAGMENT_ADDRESS: &str = "EQBAjaOyi2wGWlk-EDkSabqqnF-MrrwMadnwqrurKpkla9nE";
pub const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";
pub const DEFAULT_SYMBOL: &str = "TONUSDT";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            toncenter_url: DEFAULT_TONCENTER_URL.to_string(),
            toncenter_api_key: None,
            fragment_address: DEFAULT_FRAGMENT_ADDRESS.to_string(),
            binance_url: DEFAULT_BINANCE_URL.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SourceConfig {
    /// Build the shared blocking HTTP client
    pub fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("stars-rates/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StarsRateError::Client(e.to_string()))
    }

    /// Both production sources sharing one client
    pub fn build_sources(&self) -> Result<(FragmentSource, BinanceSource)> {
        let client = self.build_client()?;
        Ok((
            FragmentSource::new(client.clone(), self),
            BinanceSource::new(client, self),
        ))
    }
}

/// Send a request and return the body, mapping non-2xx statuses to `SourceError::Api`
fn fetch_body(request: RequestBuilder) -> SourceResult<String> {
    let response = request.send()?;
    let status = response.status();
    debug!("{} {}", status.as_u16(), response.url());

    let body = response.text()?;
    if !status.is_success() {
        return Err(SourceError::Api(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate(&body, 200)
        )));
    }
    Ok(body)
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
