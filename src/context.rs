//! Application context: `DashboardContext` owns every shared component.
//!
//! The cache, fetchers, live feed, store and coordinator are built once here
//! and handed to each other explicitly. Their lifetime is the context's:
//! `start()` activates syncing, `shutdown()` tears it down.

use crate::cache::DataCache;
use crate::config::SyncConfig;
use crate::domain::macro_series::client::MacroSeriesFetcher;
use crate::domain::price::client::PriceFetcher;
use crate::error::SyncError;
use crate::http::ApiClient;
use crate::store::{DashboardState, StateStore, UiSlice};
use crate::sync::{CoordinatorConfig, SyncCoordinator};
use crate::ws::{FeedConnector, LiveFeedClient};

use std::sync::Arc;

/// The primary entry point: a fully wired sync layer.
#[derive(Debug, Clone)]
pub struct DashboardContext {
    config: SyncConfig,
    cache: DataCache,
    store: StateStore,
    prices: PriceFetcher,
    macro_series: MacroSeriesFetcher,
    live: LiveFeedClient,
    coordinator: SyncCoordinator,
}

impl DashboardContext {
    pub fn builder() -> DashboardContextBuilder {
        DashboardContextBuilder::default()
    }

    /// Context configured from defaults and the process environment.
    pub fn from_env() -> Result<Self, SyncError> {
        Self::builder().config(SyncConfig::from_env()?).build()
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn prices(&self) -> &PriceFetcher {
        &self.prices
    }

    pub fn macro_series(&self) -> &MacroSeriesFetcher {
        &self.macro_series
    }

    pub fn live_feed(&self) -> &LiveFeedClient {
        &self.live
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Run the initial syncs and start polling and live updates.
    pub async fn start(&self) {
        self.coordinator.start().await;
    }

    /// Stop background work, close the live feed and drop cached responses.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.live.disconnect();
        self.cache.clear();
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct DashboardContextBuilder {
    config: Option<SyncConfig>,
    connector: Option<Arc<dyn FeedConnector>>,
}

impl DashboardContextBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the tungstenite transport, e.g. with an in-memory feed.
    pub fn live_connector(mut self, connector: Arc<dyn FeedConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn build(self) -> Result<DashboardContext, SyncError> {
        let config = match self.config {
            Some(config) => config,
            None => SyncConfig::builder().build()?,
        };

        let cache = DataCache::new();
        let prices = PriceFetcher::new(
            ApiClient::new(&config.price_api_url, config.http_timeout)?,
            cache.clone(),
            &config.coin_id,
        )
        .with_ttls(config.current_price_ttl, config.history_ttl);
        let macro_series = MacroSeriesFetcher::new(
            ApiClient::new(&config.macro_api_url, config.http_timeout)?,
            &config.series_id,
            config.macro_api_key.clone(),
        );

        let live = match self.connector {
            Some(connector) => LiveFeedClient::new(config.live_feed_config(), connector),
            None => LiveFeedClient::native(config.live_feed_config()),
        };

        let store = StateStore::new(DashboardState {
            ui: UiSlice {
                selected_timeframe: config.default_timeframe,
                real_time_enabled: config.live_feed_enabled,
                ..UiSlice::default()
            },
            ..DashboardState::default()
        });

        let coordinator = SyncCoordinator::new(
            CoordinatorConfig::from(&config),
            Arc::new(prices.clone()),
            Arc::new(macro_series.clone()),
            Some(live.clone()),
            cache.clone(),
            store.clone(),
        );

        Ok(DashboardContext {
            config,
            cache,
            store,
            prices,
            macro_series,
            live,
            coordinator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedData;
    use crate::shared::Timeframe;
    use crate::ws::ConnectionState;
    use std::time::Duration;

    #[test]
    fn test_build_with_defaults() {
        let ctx = DashboardContext::builder().build().unwrap();
        assert_eq!(ctx.config().coin_id, "bitcoin");
        assert_eq!(ctx.prices().coin_id(), "bitcoin");
        assert_eq!(ctx.macro_series().series_id(), "M2SL");
        assert_eq!(ctx.live_feed().state(), ConnectionState::Disconnected);
        assert!(!ctx.coordinator().is_running());
    }

    #[test]
    fn test_store_starts_with_configured_selection() {
        let config = SyncConfig::builder()
            .default_timeframe(Timeframe::Year1)
            .live_feed_enabled(false)
            .build()
            .unwrap();
        let ctx = DashboardContext::builder().config(config).build().unwrap();
        let ui = ctx.store().snapshot().ui;
        assert_eq!(ui.selected_timeframe, Timeframe::Year1);
        assert!(!ui.real_time_enabled);
    }

    #[test]
    fn test_components_share_one_cache() {
        let ctx = DashboardContext::builder().build().unwrap();
        ctx.cache().set(
            "shared-entry",
            CachedData::History(Default::default()),
            Duration::from_secs(5),
        );
        assert!(ctx.coordinator().cache().contains("shared-entry"));
    }
}
