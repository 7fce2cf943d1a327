//! # btc-m2-sync
//!
//! Data synchronization and caching layer for a Bitcoin price vs. M2 money
//! supply dashboard.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! 1. **Core**: Timeframes, domain models, expiring cache, state store, errors, config
//! 2. **HTTP API**: `ApiClient` plus the price and macro series fetchers
//! 3. **Live Feed**: `LiveFeedClient` state machine; `tokio-tungstenite` transport (native)
//! 4. **Coordinator**: `SyncCoordinator`, the single writer of the store's data slices
//! 5. **Context**: `DashboardContext` wiring everything together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use btc_m2_sync::prelude::*;
//!
//! let ctx = DashboardContext::from_env()?;
//! ctx.start().await;
//!
//! let mut state = ctx.store().subscribe();
//! while state.changed().await.is_ok() {
//!     let snapshot = state.borrow_and_update().clone();
//!     render(&snapshot);
//! }
//! ```

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Shared types used across all domains.
pub mod shared;

/// Domain modules (vertical slices): types, wire types, conversions, fetchers.
pub mod domain;

/// Expiring key/value cache.
pub mod cache;

/// Dashboard state store.
pub mod store;

/// Unified error types.
pub mod error;

/// Network URL constants.
pub mod network;

/// Runtime configuration.
pub mod config;

// ── Layer 2: HTTP API ────────────────────────────────────────────────────────

/// Fail-fast HTTP client.
#[cfg(feature = "http")]
pub mod http;

// ── Layer 3: Live Feed ───────────────────────────────────────────────────────

/// Live price feed: connection state, listeners, reconnect policy.
pub mod ws;

// ── Layer 4: Coordinator ─────────────────────────────────────────────────────

/// Fetch orchestration, polling and coalescing.
pub mod sync;

// ── Layer 5: Context ─────────────────────────────────────────────────────────

/// `DashboardContext`: the primary entry point.
#[cfg(all(feature = "http", feature = "ws-native"))]
pub mod context;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared types
    pub use crate::shared::{Revision, Timeframe};

    // Domain types: price
    pub use crate::domain::price::{
        CurrentPrice, HistoricalSeries, PriceOrigin, PricePoint, PriceTick,
    };

    // Domain types: macro series
    pub use crate::domain::macro_series::{MacroSeries, MacroSeriesPoint, SeriesMetadata};

    // Cache + store
    pub use crate::cache::{CachedData, DataCache, ExpiringCache};
    pub use crate::store::{
        ChartType, DashboardState, DomainError, StateStore, SyncStatus, UiSlice,
    };

    // Errors
    pub use crate::error::{ConfigError, ErrorKind, HttpError, SyncError, WsError};

    // Config
    pub use crate::config::{SyncConfig, SyncConfigBuilder};

    // HTTP client + fetchers
    #[cfg(feature = "http")]
    pub use crate::domain::macro_series::client::MacroSeriesFetcher;
    #[cfg(feature = "http")]
    pub use crate::domain::price::client::PriceFetcher;
    #[cfg(feature = "http")]
    pub use crate::http::ApiClient;

    // Live feed
    pub use crate::ws::{
        ConnectionState, FeedHealth, LiveFeedClient, LiveFeedConfig, ReconnectPolicy,
        SubscriberId, TickStream,
    };

    // Coordinator
    pub use crate::sync::{
        CoordinatorConfig, MacroSeriesProvider, PriceProvider, SyncCoordinator, SyncOutcome,
    };

    // Context
    #[cfg(all(feature = "http", feature = "ws-native"))]
    pub use crate::context::{DashboardContext, DashboardContextBuilder};
}
