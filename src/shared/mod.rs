//! Shared newtypes and utilities used across all domain modules.

pub mod serde_util;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ─── Timeframe ───────────────────────────────────────────────────────────────

/// Chart timeframe selected in the UI.
///
/// Drives both the price history span and the macro observation window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "24h")]
    Day1,
    #[serde(rename = "7d")]
    Week1,
    #[default]
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "1y")]
    Year1,
    #[serde(rename = "5y")]
    Year5,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::Day1,
        Timeframe::Week1,
        Timeframe::Days30,
        Timeframe::Days90,
        Timeframe::Year1,
        Timeframe::Year5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day1 => "24h",
            Self::Week1 => "7d",
            Self::Days30 => "30d",
            Self::Days90 => "90d",
            Self::Year1 => "1y",
            Self::Year5 => "5y",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Day1 => "24H",
            Self::Week1 => "7D",
            Self::Days30 => "30D",
            Self::Days90 => "90D",
            Self::Year1 => "1Y",
            Self::Year5 => "5Y",
        }
    }

    /// Span of the timeframe in days, as requested from the price API.
    pub fn days(&self) -> u32 {
        match self {
            Self::Day1 => 1,
            Self::Week1 => 7,
            Self::Days30 => 30,
            Self::Days90 => 90,
            Self::Year1 => 365,
            Self::Year5 => 1825,
        }
    }

    /// Inclusive observation window ending at `today`.
    ///
    /// Year-based timeframes subtract calendar years so leap days don't shift
    /// the start date.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = match self {
            Self::Year1 => today.checked_sub_months(Months::new(12)),
            Self::Year5 => today.checked_sub_months(Months::new(60)),
            other => today.checked_sub_days(Days::new(other.days() as u64)),
        };
        (start.unwrap_or(NaiveDate::MIN), today)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| format!("unknown timeframe: {}", s))
    }
}

// ─── Revision ────────────────────────────────────────────────────────────────

/// Monotonic write ticket for the current price.
///
/// Issued when data is observed (fetch start, tick receipt), not when it is
/// written, so a slow fetch can't overwrite a tick that arrived after it began.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Shared issuer of [`Revision`]s. Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct RevisionCounter(Arc<AtomicU64>);

impl RevisionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Revision {
        Revision(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
