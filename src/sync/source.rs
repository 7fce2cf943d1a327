//! Upstream seams used by the coordinator.
//!
//! The HTTP fetchers implement these; tests substitute in-memory fakes.

use crate::domain::macro_series::MacroSeries;
use crate::domain::price::{CurrentPrice, HistoricalSeries};
use crate::error::SyncError;

use async_trait::async_trait;
use chrono::NaiveDate;

/// Source of current and historical prices.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Latest quote. Errors propagate; no value is fabricated on failure.
    async fn current_price(&self) -> Result<CurrentPrice, SyncError>;

    /// Series covering roughly `[now - days, now]`, ascending.
    async fn historical_data(&self, days: u32) -> Result<HistoricalSeries, SyncError>;
}

/// Source of the macro series.
#[async_trait]
pub trait MacroSeriesProvider: Send + Sync {
    /// Observations within the inclusive `[start, end]` range, ascending.
    async fn macro_series(&self, start: NaiveDate, end: NaiveDate)
        -> Result<MacroSeries, SyncError>;
}
