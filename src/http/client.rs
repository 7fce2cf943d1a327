//! Low-level HTTP client: `ApiClient`.
//!
//! One instance per upstream base URL. Fails fast: no retries at this layer,
//! callers own the retry policy. Rate limiting is detected and logged here so
//! every upstream reports it the same way.

use crate::error::HttpError;

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin GET client bound to one base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query` and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, HttpError> {
        let url = self.url(path, query);

        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(path, "Request timed out");
                HttpError::Timeout
            } else {
                HttpError::Reqwest(e)
            }
        })?;

        let resp = self.check_status(path, resp).await?;
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout
            } else {
                HttpError::Reqwest(e)
            }
        })?;

        serde_json::from_str(&body).map_err(|e| HttpError::Decode(e.to_string()))
    }

    async fn check_status(&self, path: &str, resp: Response) -> Result<Response, HttpError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        if status.as_u16() == 429 {
            let retry_after_ms = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_ms);
            tracing::warn!(
                path,
                base_url = %self.base_url,
                retry_after_ms = ?retry_after_ms,
                "Rate limited by upstream"
            );
            return Err(HttpError::RateLimited { retry_after_ms });
        }

        let body = resp.text().await.unwrap_or_default();
        Err(HttpError::Upstream {
            status: status.as_u16(),
            body,
        })
    }

    /// Query values are percent-encoded; the path is taken verbatim.
    fn url(&self, path: &str, query: &[(&str, String)]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            let params: Vec<String> = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            url = format!("{}?{}", url, params.join("&"));
        }
        url
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after_ms(value: &str) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}
