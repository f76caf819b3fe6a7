//! Cross-rate aggregation over the two source legs

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::sources::{ExchangeSource, MarketplaceSource};
use crate::types::{RatePoint, Result, StarsRateError, MAX_TRANSACTION_LIMIT};

/// Combines a marketplace leg and an exchange leg into a Stars -> USDT rate
pub struct RateAggregator<M, E> {
    marketplace: M,
    exchange: E,
}

impl<M: MarketplaceSource, E: ExchangeSource> RateAggregator<M, E> {
    pub fn new(marketplace: M, exchange: E) -> Self {
        Self {
            marketplace,
            exchange,
        }
    }

    /// Fetch both legs and combine them, stamped with the current time
    pub fn compute(&self, limit: u32, include_raw: bool) -> Result<RatePoint> {
        self.compute_at(limit, include_raw, Utc::now())
    }

    /// Fetch both legs and combine them into a point created at `now`.
    ///
    /// Leg failures never surface as `Err`: they end up in `RatePoint::errors`
    /// with the affected rate at 0. The only error is an out-of-range `limit`.
    pub fn compute_at(&self, limit: u32, include_raw: bool, now: DateTime<Utc>) -> Result<RatePoint> {
        if limit == 0 || limit > MAX_TRANSACTION_LIMIT {
            return Err(StarsRateError::InvalidLimit(limit));
        }

        debug!("fetching {} (limit {})", self.marketplace.name(), limit);
        let marketplace = self.marketplace.fetch_marketplace_rate(limit);
        if let Err(e) = &marketplace {
            warn!("{} leg failed: {}", self.marketplace.name(), e);
        }

        debug!("fetching {}", self.exchange.name());
        let exchange = self.exchange.fetch_spot_rate();
        if let Err(e) = &exchange {
            warn!("{} leg failed: {}", self.exchange.name(), e);
        }

        let point = RatePoint::from_legs(now, marketplace, exchange, include_raw);
        debug!(
            "usdt_per_star={} (ton_per_star={}, usdt_per_ton={})",
            point.usdt_per_star, point.ton_per_star, point.usdt_per_ton
        );
        Ok(point)
    }
}
