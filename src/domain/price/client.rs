//! Price fetcher: current quote and historical series, cached.

use super::convert::{current_price_from_simple, history_from_market_chart};
use super::wire::{MarketChartResponse, SimplePriceResponse};
use super::{CurrentPrice, HistoricalSeries, HistoryInterval};
use crate::cache::{keys, CachedData, DataCache};
use crate::error::SyncError;
use crate::http::ApiClient;
use crate::sync::source::PriceProvider;

use async_trait::async_trait;
use std::time::Duration;

/// Default TTL for the current quote.
pub const CURRENT_PRICE_TTL: Duration = Duration::from_secs(30);

/// Default TTL for historical series.
pub const HISTORY_TTL: Duration = Duration::from_secs(5 * 60);

/// Fetches prices for one coin from the price API.
///
/// Both lookups consult the shared cache first. Failures are never cached.
#[derive(Debug, Clone)]
pub struct PriceFetcher {
    http: ApiClient,
    cache: DataCache,
    coin_id: String,
    current_ttl: Duration,
    history_ttl: Duration,
}

impl PriceFetcher {
    pub fn new(http: ApiClient, cache: DataCache, coin_id: &str) -> Self {
        Self {
            http,
            cache,
            coin_id: coin_id.to_string(),
            current_ttl: CURRENT_PRICE_TTL,
            history_ttl: HISTORY_TTL,
        }
    }

    pub fn with_ttls(mut self, current: Duration, history: Duration) -> Self {
        self.current_ttl = current;
        self.history_ttl = history;
        self
    }

    pub fn coin_id(&self) -> &str {
        &self.coin_id
    }

    /// Current price + 24h change. Cached under `price-current`.
    pub async fn get_current_price(&self) -> Result<CurrentPrice, SyncError> {
        if let Some(CachedData::CurrentPrice(cached)) = self.cache.get(keys::PRICE_CURRENT) {
            tracing::debug!(key = keys::PRICE_CURRENT, "Cache hit");
            return Ok(cached);
        }

        let resp: SimplePriceResponse = self
            .http
            .get(
                "/simple/price",
                &[
                    ("ids", self.coin_id.clone()),
                    ("vs_currencies", "usd".to_string()),
                    ("include_24hr_change", "true".to_string()),
                    ("include_last_updated_at", "true".to_string()),
                ],
            )
            .await
            .inspect_err(|e| tracing::warn!(coin = %self.coin_id, "Failed to fetch current price: {}", e))?;

        let price = current_price_from_simple(resp, &self.coin_id)?;
        self.cache.set(
            keys::PRICE_CURRENT,
            CachedData::CurrentPrice(price.clone()),
            self.current_ttl,
        );
        Ok(price)
    }

    /// Historical series for the last `days` days. Cached per `days`.
    ///
    /// Granularity follows the span: hourly up to 90 days, daily beyond.
    pub async fn get_historical_data(&self, days: u32) -> Result<HistoricalSeries, SyncError> {
        let key = keys::price_history(days);
        if let Some(CachedData::History(cached)) = self.cache.get(&key) {
            tracing::debug!(key = %key, "Cache hit");
            return Ok(cached);
        }

        let interval = HistoryInterval::for_days(days);
        let path = format!("/coins/{}/market_chart", urlencoding::encode(&self.coin_id));
        let resp: MarketChartResponse = self
            .http
            .get(
                &path,
                &[
                    ("vs_currency", "usd".to_string()),
                    ("days", days.to_string()),
                    ("interval", interval.as_str().to_string()),
                ],
            )
            .await
            .inspect_err(|e| tracing::warn!(coin = %self.coin_id, days, "Failed to fetch historical data: {}", e))?;

        let series = history_from_market_chart(resp)?;
        self.cache
            .set(key, CachedData::History(series.clone()), self.history_ttl);
        Ok(series)
    }
}

#[async_trait]
impl PriceProvider for PriceFetcher {
    async fn current_price(&self) -> Result<CurrentPrice, SyncError> {
        self.get_current_price().await
    }

    async fn historical_data(&self, days: u32) -> Result<HistoricalSeries, SyncError> {
        self.get_historical_data(days).await
    }
}
