//! Unified error types.
//!
//! Every failure maps onto one of four kinds ([`ErrorKind`]): network, rate
//! limit, upstream, configuration. Only configuration errors are terminal.

use std::time::Duration;
use thiserror::Error;

/// Top-level error.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SyncError {
    /// Classify this error into the retry taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Http(e) => e.kind(),
            SyncError::Ws(_) => ErrorKind::Network,
            SyncError::Config(_) => ErrorKind::Config,
            SyncError::Validation(_) | SyncError::Serde(_) => ErrorKind::Upstream,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Server-provided delay before the next attempt, if rate limited.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Http(HttpError::RateLimited { retry_after_ms }) => {
                retry_after_ms.map(Duration::from_millis)
            }
            _ => None,
        }
    }
}

/// Error taxonomy surfaced to the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeout or unreachable upstream.
    Network,
    /// HTTP 429.
    RateLimit,
    /// Non-2xx response or schema mismatch.
    Upstream,
    /// Missing credentials or invalid settings. Not retryable.
    Config,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Config)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP-layer errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[cfg(feature = "http")]
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl HttpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            #[cfg(feature = "http")]
            HttpError::Reqwest(e) if e.is_decode() => ErrorKind::Upstream,
            #[cfg(feature = "http")]
            HttpError::Reqwest(_) => ErrorKind::Network,
            HttpError::Timeout => ErrorKind::Network,
            HttpError::RateLimited { .. } => ErrorKind::RateLimit,
            HttpError::Upstream { .. } | HttpError::Decode(_) => ErrorKind::Upstream,
        }
    }
}

/// Live feed transport errors.
#[derive(Error, Debug, Clone)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Connection closed: code={code:?} reason={reason}")]
    Closed { code: Option<u16>, reason: String },

    #[error("No async runtime available to drive the connection")]
    NoRuntime,
}

/// Configuration errors. Never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing API key for {0}")]
    MissingApiKey(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
