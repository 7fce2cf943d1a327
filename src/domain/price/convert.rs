//! Conversions from wire types to price domain types.

use super::wire::{MarketChartResponse, SimplePriceResponse, TickerMessage};
use super::{CurrentPrice, HistoricalSeries, PriceOrigin, PricePoint, PriceTick};
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Extract `coin_id`'s quote from a `/simple/price` response.
pub fn current_price_from_simple(
    mut resp: SimplePriceResponse,
    coin_id: &str,
) -> Result<CurrentPrice, SyncError> {
    let quote = resp
        .remove(coin_id)
        .ok_or_else(|| SyncError::Validation(format!("No quote for {}", coin_id)))?;

    if !quote.usd.is_finite() {
        return Err(SyncError::Validation(format!(
            "Non-finite price for {}: {}",
            coin_id, quote.usd
        )));
    }

    let last_updated = match quote.last_updated_at {
        Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
            SyncError::Validation(format!("Invalid last_updated_at: {}", secs))
        })?,
        None => Utc::now(),
    };

    Ok(CurrentPrice {
        price: quote.usd,
        change_24h: quote.usd_24h_change.unwrap_or_default(),
        last_updated,
        volume_24h: None,
        origin: PriceOrigin::Poll,
        error: false,
    })
}

/// Map `[epoch_ms, price]` rows into an ascending series, joining volumes
/// that share a timestamp.
pub fn history_from_market_chart(resp: MarketChartResponse) -> Result<HistoricalSeries, SyncError> {
    let volumes: HashMap<i64, f64> = resp
        .total_volumes
        .iter()
        .map(|(ms, vol)| (*ms as i64, *vol))
        .collect();

    let points = resp
        .prices
        .into_iter()
        .map(|(ms, price)| {
            let millis = ms as i64;
            let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
                .ok_or_else(|| SyncError::Validation(format!("Invalid timestamp: {}", ms)))?;
            Ok(PricePoint {
                timestamp,
                price,
                volume: volumes.get(&millis).copied(),
            })
        })
        .collect::<Result<Vec<_>, SyncError>>()?;

    Ok(HistoricalSeries::from_points(points))
}

impl From<TickerMessage> for PriceTick {
    fn from(msg: TickerMessage) -> Self {
        Self {
            price: msg.last_price,
            change_24h: msg.change_percent,
            volume: msg.volume,
            timestamp: msg.event_time.unwrap_or_else(Utc::now),
        }
    }
}

/// Parse one raw ticker frame.
pub fn parse_tick(text: &str) -> Result<PriceTick, SyncError> {
    let msg: TickerMessage = serde_json::from_str(text)?;
    Ok(msg.into())
}
