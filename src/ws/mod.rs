//! Live feed layer: connection state, listeners, reconnect policy.
//!
//! [`LiveFeedClient`] owns the state machine and is transport-agnostic: it
//! drives any [`FeedConnector`]. The `tokio-tungstenite` transport lives in
//! `native.rs` behind the `ws-native` feature.

pub mod backoff;
pub mod feed;
pub mod subscriptions;

#[cfg(feature = "ws-native")]
pub mod native;

use crate::error::WsError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use backoff::ReconnectPolicy;
pub use feed::{LiveFeedClient, TickStream};
pub use subscriptions::{ListenerError, SubscriberId, TickListener};

// ─── ConnectionState ─────────────────────────────────────────────────────────

/// Connection lifecycle. Only the client transitions it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── FeedHealth ──────────────────────────────────────────────────────────────

/// Observable health of the live feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedHealth {
    pub state: ConnectionState,
    /// Consecutive failed connection attempts since the last successful open.
    pub attempts: u32,
    /// Reconnects were exhausted; the feed stays down until a new subscriber.
    pub exhausted: bool,
}

impl FeedHealth {
    /// The UI should fall back to polling-only.
    pub fn is_degraded(&self) -> bool {
        self.exhausted
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// Configuration for the live feed client.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveFeedConfig {
    pub url: String,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            url: crate::network::DEFAULT_LIVE_FEED_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

// ─── Transport seam ──────────────────────────────────────────────────────────

/// Opens streaming connections.
#[async_trait]
pub trait FeedConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, WsError>;
}

/// One open streaming connection.
#[async_trait]
pub trait FeedConnection: Send {
    /// Next text frame. `None` means the stream ended; `Some(Err)` means the
    /// connection broke. Control frames are handled by the transport.
    async fn next_frame(&mut self) -> Option<Result<String, WsError>>;

    /// Close gracefully. Errors are ignored.
    async fn close(&mut self);
}
