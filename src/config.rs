//! Runtime configuration: `SyncConfig` and its builder.
//!
//! Defaults target the public CoinGecko, FRED and Binance endpoints. Only two
//! settings come from the environment: the macro API key and the live feed
//! switch.

use crate::error::ConfigError;
use crate::network::{DEFAULT_LIVE_FEED_URL, DEFAULT_MACRO_API_URL, DEFAULT_PRICE_API_URL};
use crate::shared::Timeframe;
use crate::ws::{LiveFeedConfig, ReconnectPolicy};

use std::time::Duration;

/// Environment variable holding the macro API key.
pub const MACRO_API_KEY_ENV: &str = "FRED_API_KEY";

/// Environment variable toggling the live feed.
pub const LIVE_FEED_ENV: &str = "LIVE_FEED_ENABLED";

/// Resolved settings for the whole sync layer.
#[derive(Clone, PartialEq)]
pub struct SyncConfig {
    pub price_api_url: String,
    pub macro_api_url: String,
    pub live_feed_url: String,
    pub coin_id: String,
    pub series_id: String,
    /// Absent keys are reported on the first macro fetch, not here.
    pub macro_api_key: Option<String>,
    pub live_feed_enabled: bool,
    pub http_timeout: Duration,
    pub poll_interval: Duration,
    pub current_price_ttl: Duration,
    pub history_ttl: Duration,
    pub macro_ttl: Duration,
    pub reconnect: ReconnectPolicy,
    pub default_timeframe: Timeframe,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("price_api_url", &self.price_api_url)
            .field("macro_api_url", &self.macro_api_url)
            .field("live_feed_url", &self.live_feed_url)
            .field("coin_id", &self.coin_id)
            .field("series_id", &self.series_id)
            .field("macro_api_key", &self.macro_api_key.as_ref().map(|_| "<redacted>"))
            .field("live_feed_enabled", &self.live_feed_enabled)
            .field("poll_interval", &self.poll_interval)
            .field("default_timeframe", &self.default_timeframe)
            .finish_non_exhaustive()
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Defaults plus `FRED_API_KEY` and `LIVE_FEED_ENABLED` from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().env_with(|name| std::env::var(name).ok())?.build()
    }

    pub fn live_feed_config(&self) -> LiveFeedConfig {
        LiveFeedConfig {
            url: self.live_feed_url.clone(),
            reconnect: self.reconnect.clone(),
            ..LiveFeedConfig::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfigBuilder::default().into_config()
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self {
            config: SyncConfig {
                price_api_url: DEFAULT_PRICE_API_URL.to_string(),
                macro_api_url: DEFAULT_MACRO_API_URL.to_string(),
                live_feed_url: DEFAULT_LIVE_FEED_URL.to_string(),
                coin_id: "bitcoin".to_string(),
                series_id: "M2SL".to_string(),
                macro_api_key: None,
                live_feed_enabled: true,
                http_timeout: Duration::from_secs(10),
                poll_interval: Duration::from_secs(30),
                current_price_ttl: Duration::from_secs(30),
                history_ttl: Duration::from_secs(5 * 60),
                macro_ttl: Duration::from_secs(60 * 60),
                reconnect: ReconnectPolicy::default(),
                default_timeframe: Timeframe::default(),
            },
        }
    }
}

impl SyncConfigBuilder {
    pub fn price_api_url(mut self, url: &str) -> Self {
        self.config.price_api_url = url.to_string();
        self
    }

    pub fn macro_api_url(mut self, url: &str) -> Self {
        self.config.macro_api_url = url.to_string();
        self
    }

    pub fn live_feed_url(mut self, url: &str) -> Self {
        self.config.live_feed_url = url.to_string();
        self
    }

    pub fn coin_id(mut self, id: &str) -> Self {
        self.config.coin_id = id.to_string();
        self
    }

    pub fn series_id(mut self, id: &str) -> Self {
        self.config.series_id = id.to_string();
        self
    }

    pub fn macro_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.macro_api_key = Some(key.into());
        self
    }

    pub fn live_feed_enabled(mut self, enabled: bool) -> Self {
        self.config.live_feed_enabled = enabled;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn cache_ttls(mut self, current: Duration, history: Duration, macro_series: Duration) -> Self {
        self.config.current_price_ttl = current;
        self.config.history_ttl = history;
        self.config.macro_ttl = macro_series;
        self
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn default_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.config.default_timeframe = timeframe;
        self
    }

    /// Apply environment overrides read through `lookup`.
    pub fn env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(MACRO_API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.config.macro_api_key = Some(key);
        }
        if let Some(raw) = lookup(LIVE_FEED_ENV) {
            self.config.live_feed_enabled = parse_flag(LIVE_FEED_ENV, &raw)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        let config = self.config;
        for (name, url) in [
            ("price_api_url", &config.price_api_url),
            ("macro_api_url", &config.macro_api_url),
            ("live_feed_url", &config.live_feed_url),
        ] {
            if url.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    name,
                    value: url.clone(),
                });
            }
        }
        for (name, value) in [
            ("http_timeout", config.http_timeout),
            ("poll_interval", config.poll_interval),
            ("reconnect.base_delay", config.reconnect.base_delay),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    name,
                    value: "0s".to_string(),
                });
            }
        }
        Ok(config)
    }

    fn into_config(self) -> SyncConfig {
        self.config
    }
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}
