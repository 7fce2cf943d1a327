//! Price domain: current quote, historical series, live ticks.

#[cfg(feature = "http")]
pub mod client;
pub mod convert;
pub mod wire;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a [`CurrentPrice`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceOrigin {
    /// REST fetch (initial load or polling fallback).
    Poll,
    /// Streaming ticker.
    Live,
}

/// Latest known point-in-time quote.
///
/// Replaced wholesale by each fetch or tick. `error` is raised when a later
/// fetch failed and this value is the last good one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPrice {
    pub price: f64,
    pub change_24h: f64,
    pub last_updated: DateTime<Utc>,
    pub volume_24h: Option<f64>,
    pub origin: PriceOrigin,
    #[serde(default)]
    pub error: bool,
}

impl From<&PriceTick> for CurrentPrice {
    fn from(tick: &PriceTick) -> Self {
        Self {
            price: tick.price,
            change_24h: tick.change_24h,
            last_updated: tick.timestamp,
            volume_24h: Some(tick.volume),
            origin: PriceOrigin::Live,
            error: false,
        }
    }
}

/// One point of a historical price series. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

/// Price series ordered ascending by timestamp, no duplicate timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoricalSeries(Vec<PricePoint>);

impl HistoricalSeries {
    /// Build a series from points in any order. Later duplicates of a
    /// timestamp win.
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match out.last_mut() {
                Some(last) if last.timestamp == point.timestamp => *last = point,
                _ => out.push(point),
            }
        }
        Self(out)
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.0
    }

    pub fn into_points(self) -> Vec<PricePoint> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.0.first()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.0.last()
    }
}

/// An incremental update from the streaming ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub price: f64,
    pub change_24h: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// Granularity of the historical series.
///
/// Picked by the fetcher from the requested span, never by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryInterval {
    Hourly,
    Daily,
}

impl HistoryInterval {
    /// Spans beyond 90 days use daily points.
    pub fn for_days(days: u32) -> Self {
        if days > 90 {
            Self::Daily
        } else {
            Self::Hourly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ms: i64, price: f64) -> PricePoint {
        PricePoint {
            timestamp: DateTime::<Utc>::from_timestamp_millis(ms).unwrap(),
            price,
            volume: None,
        }
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let series = HistoricalSeries::from_points(vec![
            point(3000, 3.0),
            point(1000, 1.0),
            point(2000, 2.0),
            point(1000, 1.5),
        ]);
        let prices: Vec<f64> = series.points().iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![1.5, 2.0, 3.0]);
        assert_eq!(series.latest().unwrap().price, 3.0);
    }

    #[test]
    fn test_history_interval_threshold() {
        assert_eq!(HistoryInterval::for_days(1), HistoryInterval::Hourly);
        assert_eq!(HistoryInterval::for_days(90), HistoryInterval::Hourly);
        assert_eq!(HistoryInterval::for_days(91), HistoryInterval::Daily);
        assert_eq!(HistoryInterval::for_days(1825).as_str(), "daily");
    }

    #[test]
    fn test_current_price_from_tick() {
        let tick = PriceTick {
            price: 51000.0,
            change_24h: -1.2,
            volume: 12345.0,
            timestamp: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap(),
        };
        let current = CurrentPrice::from(&tick);
        assert_eq!(current.price, 51000.0);
        assert_eq!(current.volume_24h, Some(12345.0));
        assert_eq!(current.origin, PriceOrigin::Live);
        assert!(!current.error);
    }
}
