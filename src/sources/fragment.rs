//! Fragment marketplace leg: Stars purchases read from toncenter

use log::{debug, trace};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::{fetch_body, MarketplaceSource, SourceConfig, SourceResult};
use crate::types::{MarketplaceQuote, SourceError};

const NANOTON_PER_TON: f64 = 1_000_000_000.0;

/// Comment marker Fragment puts on Stars purchases, e.g. "50 Telegram Stars"
const STARS_MARKER: &str = "telegram stars";

/// toncenter v2 `getTransactions` envelope
#[derive(Deserialize)]
struct TonCenterResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TonTransaction>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TonTransaction {
    in_msg: Option<TonMessage>,
    #[serde(default)]
    out_msgs: Vec<TonMessage>,
}

#[derive(Deserialize)]
struct TonMessage {
    /// Amount in nanoton, as a decimal string
    #[serde(default)]
    value: String,
    /// Text comment
    #[serde(default)]
    message: String,
}

/// One Stars purchase found in a transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Purchase {
    pub stars: u64,
    pub ton: f64,
}

impl Purchase {
    pub fn ton_per_star(&self) -> f64 {
        self.ton / self.stars as f64
    }
}

/// Marketplace source backed by the Fragment wallet's transaction history
pub struct FragmentSource {
    client: Client,
    base_url: String,
    address: String,
    api_key: Option<String>,
}

impl FragmentSource {
    pub fn new(client: Client, config: &SourceConfig) -> Self {
        Self {
            client,
            base_url: config.toncenter_url.trim_end_matches('/').to_string(),
            address: config.fragment_address.clone(),
            api_key: config.toncenter_api_key.clone(),
        }
    }

    /// Parse a `getTransactions` body into a quote
    pub fn parse_response(body: &str) -> SourceResult<MarketplaceQuote> {
        let response: TonCenterResponse =
            serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;

        if !response.ok {
            return Err(SourceError::Api(
                response.error.unwrap_or_else(|| "toncenter returned ok=false".into()),
            ));
        }

        let examined = response.result.len();
        let purchases: Vec<Purchase> = response
            .result
            .iter()
            .filter_map(extract_purchase)
            .collect();
        debug!(
            "fragment: {} purchases in {} transactions",
            purchases.len(),
            examined
        );

        summarize(&purchases).ok_or(SourceError::NoTransactions { examined })
    }
}

impl MarketplaceSource for FragmentSource {
    fn name(&self) -> &str {
        "fragment"
    }

    fn fetch_marketplace_rate(&self, limit: u32) -> SourceResult<MarketplaceQuote> {
        let url = format!("{}/getTransactions", self.base_url);
        let limit = limit.to_string();
        let mut request = self.client.get(&url).query(&[
            ("address", self.address.as_str()),
            ("limit", limit.as_str()),
            ("archival", "true"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let body = fetch_body(request)?;
        Self::parse_response(&body)
    }
}

/// First message of a transaction that carries a Stars comment and a positive value
fn extract_purchase(tx: &TonTransaction) -> Option<Purchase> {
    tx.in_msg.iter().chain(tx.out_msgs.iter()).find_map(|msg| {
        let stars = parse_stars_comment(&msg.message)?;
        let nano: u64 = msg.value.trim().parse().ok()?;
        if nano == 0 {
            return None;
        }
        trace!("purchase: {} stars for {} nanoton", stars, nano);
        Some(Purchase {
            stars,
            ton: nano as f64 / NANOTON_PER_TON,
        })
    })
}

/// Extract the Star count from a comment like "1,000 Telegram Stars \n\nRef#abc".
///
/// Returns `None` for comments without the marker or with a zero count.
pub fn parse_stars_comment(comment: &str) -> Option<u64> {
    let lower = comment.to_lowercase();
    let marker = lower.find(STARS_MARKER)?;

    let prefix = lower[..marker].trim_end();
    let digits: String = prefix
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    match digits.parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

/// Mean, min, max and median TON per Star; `None` for an empty set
pub fn summarize(purchases: &[Purchase]) -> Option<MarketplaceQuote> {
    if purchases.is_empty() {
        return None;
    }

    let mut rates: Vec<f64> = purchases.iter().map(Purchase::ton_per_star).collect();
    rates.sort_by(|a, b| a.total_cmp(b));

    let n = rates.len();
    let mean = rates.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (rates[n / 2 - 1] + rates[n / 2]) / 2.0
    } else {
        rates[n / 2]
    };

    Some(MarketplaceQuote {
        ton_per_star: mean,
        transactions_count: n,
        min_rate: rates[0],
        max_rate: rates[n - 1],
        median_rate: median,
        total_stars: purchases.iter().map(|p| p.stars).sum(),
        total_ton: purchases.iter().map(|p| p.ton).sum(),
    })
}
