//! Macro series domain: weekly money supply observations.

#[cfg(feature = "http")]
pub mod client;
pub mod convert;
pub mod wire;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One reporting period of the macro series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroSeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Observations ordered ascending by date, one point per period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroSeries(Vec<MacroSeriesPoint>);

impl MacroSeries {
    /// Build a series from points in any order. Later duplicates of a date win.
    pub fn from_points(mut points: Vec<MacroSeriesPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        let mut out: Vec<MacroSeriesPoint> = Vec::with_capacity(points.len());
        for point in points {
            match out.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => out.push(point),
            }
        }
        Self(out)
    }

    pub fn points(&self) -> &[MacroSeriesPoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest(&self) -> Option<&MacroSeriesPoint> {
        self.0.last()
    }
}

/// Descriptive metadata shown next to the series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesMetadata {
    pub series_id: String,
    pub units: String,
    pub source: String,
    pub frequency: String,
    pub seasonally_adjusted: bool,
}

impl Default for SeriesMetadata {
    fn default() -> Self {
        Self {
            series_id: "M2SL".to_string(),
            units: "Billions of Dollars".to_string(),
            source: "Federal Reserve Economic Data".to_string(),
            frequency: "Weekly".to_string(),
            seasonally_adjusted: true,
        }
    }
}
