//! Macro series fetcher. Uncached; the coordinator caches by timeframe.

use super::convert::DATE_FORMAT;
use super::wire::ObservationsResponse;
use super::MacroSeries;
use crate::config::MACRO_API_KEY_ENV;
use crate::error::{ConfigError, SyncError};
use crate::http::ApiClient;
use crate::sync::source::MacroSeriesProvider;

use async_trait::async_trait;
use chrono::NaiveDate;

/// Fetches weekly observations of one series.
#[derive(Clone)]
pub struct MacroSeriesFetcher {
    http: ApiClient,
    series_id: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for MacroSeriesFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroSeriesFetcher")
            .field("base_url", &self.http.base_url())
            .field("series_id", &self.series_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl MacroSeriesFetcher {
    pub fn new(http: ApiClient, series_id: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            series_id: series_id.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    /// Weekly averages within the inclusive `[start, end]` range.
    ///
    /// A missing API key is a [`ConfigError`] and is never retried.
    pub async fn get_macro_series(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MacroSeries, SyncError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ConfigError::MissingApiKey(MACRO_API_KEY_ENV))?;

        if start > end {
            return Err(SyncError::Validation(format!(
                "Observation start {} is after end {}",
                start, end
            )));
        }

        let resp: ObservationsResponse = self
            .http
            .get(
                "/series/observations",
                &[
                    ("series_id", self.series_id.clone()),
                    ("api_key", api_key.clone()),
                    ("file_type", "json".to_string()),
                    ("frequency", "w".to_string()),
                    ("aggregation_method", "avg".to_string()),
                    ("observation_start", start.format(DATE_FORMAT).to_string()),
                    ("observation_end", end.format(DATE_FORMAT).to_string()),
                ],
            )
            .await
            .inspect_err(|e| tracing::warn!(series = %self.series_id, "Failed to fetch macro series: {}", e))?;

        MacroSeries::try_from(resp)
    }
}

#[async_trait]
impl MacroSeriesProvider for MacroSeriesFetcher {
    async fn macro_series(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MacroSeries, SyncError> {
        self.get_macro_series(start, end).await
    }
}
