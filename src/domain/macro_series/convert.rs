//! Conversions from wire types to macro series domain types.

use super::wire::ObservationsResponse;
use super::{MacroSeries, MacroSeriesPoint};
use crate::error::SyncError;
use chrono::NaiveDate;

/// Date format used on the wire in both directions.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

impl TryFrom<ObservationsResponse> for MacroSeries {
    type Error = SyncError;

    fn try_from(resp: ObservationsResponse) -> Result<Self, Self::Error> {
        let mut points = Vec::with_capacity(resp.observations.len());
        for obs in resp.observations {
            let date = NaiveDate::parse_from_str(&obs.date, DATE_FORMAT).map_err(|e| {
                SyncError::Validation(format!("Invalid observation date {:?}: {}", obs.date, e))
            })?;
            match obs.value.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => points.push(MacroSeriesPoint { date, value }),
                _ => {
                    tracing::debug!(date = %date, value = %obs.value, "Skipping missing observation");
                }
            }
        }
        Ok(MacroSeries::from_points(points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ObservationsResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_string_values_parsed_to_float() {
        let series = MacroSeries::try_from(response(
            r#"{"observations":[{"date":"2024-01-01","value":"21000.5"}]}"#,
        ))
        .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(
            series.points()[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert_eq!(series.points()[0].value, 21000.5);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let series = MacroSeries::try_from(response(
            r#"{"observations":[
                {"date":"2024-01-08","value":"20900.0"},
                {"date":"2024-01-01","value":"."}
            ]}"#,
        ))
        .unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.points()[0].value, 20900.0);
    }

    #[test]
    fn test_malformed_date_is_an_error() {
        let err = MacroSeries::try_from(response(
            r#"{"observations":[{"date":"01/02/2024","value":"1"}]}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }
}
