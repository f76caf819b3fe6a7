//! Binance spot ticker leg: TON -> USDT

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{fetch_body, ExchangeSource, SourceConfig, SourceResult};
use crate::types::{ExchangeQuote, SourceError};

/// `/api/v3/ticker/price` response
#[derive(Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// Binance error body, e.g. `{"code":-1121,"msg":"Invalid symbol."}`
#[derive(Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

pub struct BinanceSource {
    client: Client,
    base_url: String,
    symbol: String,
}

impl BinanceSource {
    pub fn new(client: Client, config: &SourceConfig) -> Self {
        Self {
            client,
            base_url: config.binance_url.trim_end_matches('/').to_string(),
            symbol: config.symbol.clone(),
        }
    }

    /// Parse a ticker body into a quote, rejecting non-positive prices
    pub fn parse_response(body: &str) -> SourceResult<ExchangeQuote> {
        if let Ok(err) = serde_json::from_str::<BinanceError>(body) {
            return Err(SourceError::Api(format!("{} (code {})", err.msg, err.code)));
        }

        let ticker: TickerPrice =
            serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;
        let price: f64 = ticker
            .price
            .trim()
            .parse()
            .map_err(|_| SourceError::Parse(format!("invalid price {:?}", ticker.price)))?;

        if !price.is_finite() || price <= 0.0 {
            return Err(SourceError::Parse(format!(
                "non-positive price {} for {}",
                price, ticker.symbol
            )));
        }

        Ok(ExchangeQuote {
            usdt_per_ton: price,
            source: "binance".to_string(),
            symbol: ticker.symbol,
        })
    }
}

impl ExchangeSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch_spot_rate(&self) -> SourceResult<ExchangeQuote> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let request = self
            .client
            .get(&url)
            .query(&[("symbol", self.symbol.as_str())]);

        let body = fetch_body(request)?;
        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ticker() {
        let quote =
            BinanceSource::parse_response(r#"{"symbol":"TONUSDT","price":"5.20000000"}"#).unwrap();
        assert_eq!(quote.usdt_per_ton, 5.2);
        assert_eq!(quote.source, "binance");
        assert_eq!(quote.symbol, "TONUSDT");
    }

    #[test]
    fn test_parse_error_body() {
        let err = BinanceSource::parse_response(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::Api(ref msg) if msg == "Invalid symbol. (code -1121)"));
    }

    #[test]
    fn test_parse_zero_price_rejected() {
        let err = BinanceSource::parse_response(r#"{"symbol":"TONUSDT","price":"0.00000000"}"#)
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_parse_garbage_price() {
        let err =
            BinanceSource::parse_response(r#"{"symbol":"TONUSDT","price":"n/a"}"#).unwrap_err();
        assert!(matches!(err, SourceError::Parse(ref msg) if msg.contains("n/a")));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            BinanceSource::parse_response("not json"),
            Err(SourceError::Parse(_))
        ));
    }
}
