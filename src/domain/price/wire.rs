//! Wire types for the price API (REST) and the ticker stream (WS).

use crate::shared::serde_util::{f64_lenient, timestamp_ms_opt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─── REST wire types ─────────────────────────────────────────────────────────

/// `GET /simple/price` response, keyed by coin id.
pub type SimplePriceResponse = HashMap<String, SimplePriceQuote>;

/// One coin's quote inside [`SimplePriceResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimplePriceQuote {
    pub usd: f64,
    #[serde(default)]
    pub usd_24h_change: Option<f64>,
    /// Unix seconds.
    #[serde(default)]
    pub last_updated_at: Option<i64>,
}

/// `GET /coins/{id}/market_chart` response.
///
/// Each row is `[epoch_ms, value]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketChartResponse {
    pub prices: Vec<(f64, f64)>,
    #[serde(default)]
    pub total_volumes: Vec<(f64, f64)>,
}

// ─── WS wire types ───────────────────────────────────────────────────────────

/// 24h rolling ticker message from the streaming endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TickerMessage {
    /// Last price.
    #[serde(rename = "c", with = "f64_lenient")]
    pub last_price: f64,
    /// 24h change in percent.
    #[serde(rename = "P", with = "f64_lenient")]
    pub change_percent: f64,
    /// 24h base asset volume.
    #[serde(rename = "v", with = "f64_lenient")]
    pub volume: f64,
    /// Event time.
    #[serde(rename = "E", default, with = "timestamp_ms_opt")]
    pub event_time: Option<DateTime<Utc>>,
}
