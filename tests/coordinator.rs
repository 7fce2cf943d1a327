//! Coordinator behavior against in-memory providers and a scripted live feed.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use btc_m2_sync::cache::{keys, DataCache};
use btc_m2_sync::domain::macro_series::{MacroSeries, MacroSeriesPoint};
use btc_m2_sync::domain::price::{CurrentPrice, HistoricalSeries, PriceOrigin, PricePoint};
use btc_m2_sync::error::{ConfigError, ErrorKind, HttpError, SyncError};
use btc_m2_sync::shared::Timeframe;
use btc_m2_sync::store::StateStore;
use btc_m2_sync::sync::{CoordinatorConfig, MacroSeriesProvider, PriceProvider, SyncCoordinator};
use btc_m2_sync::ws::{ConnectionState, LiveFeedClient, LiveFeedConfig, ReconnectPolicy};
use chrono::{DateTime, NaiveDate, Utc};
use common::feed::{ticker, FakeConnector};
use tokio_test::{assert_err, assert_ok};

// ─── Fakes ───────────────────────────────────────────────────────────────────

type Failure = fn() -> SyncError;

fn network_down() -> SyncError {
    HttpError::Timeout.into()
}

fn missing_key() -> SyncError {
    ConfigError::MissingApiKey("FRED_API_KEY").into()
}

fn rate_limited() -> SyncError {
    HttpError::RateLimited {
        retry_after_ms: Some(60_000),
    }
    .into()
}

/// Quote time of every fake fetch; one second before the fake ticker frame.
fn quoted_at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_699_999_999, 0).unwrap()
}

struct FakePrices {
    price: Mutex<f64>,
    delay: Duration,
    failure: Mutex<Option<Failure>>,
    current_calls: AtomicUsize,
    history_days: Mutex<Vec<u32>>,
}

impl FakePrices {
    fn new() -> Arc<Self> {
        Self::slow(Duration::ZERO)
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            price: Mutex::new(50_000.0),
            delay,
            failure: Mutex::new(None),
            current_calls: AtomicUsize::new(0),
            history_days: Mutex::new(Vec::new()),
        })
    }

    fn fail_with(&self, failure: Failure) {
        *self.failure.lock().unwrap() = Some(failure);
    }

    fn recover(&self, price: f64) {
        *self.failure.lock().unwrap() = None;
        *self.price.lock().unwrap() = price;
    }

    fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    fn history_days(&self) -> Vec<u32> {
        self.history_days.lock().unwrap().clone()
    }

    async fn respond<T>(&self, ok: impl FnOnce(f64) -> T) -> Result<T, SyncError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = *self.failure.lock().unwrap();
        match failure {
            Some(fail) => Err(fail()),
            None => Ok(ok(*self.price.lock().unwrap())),
        }
    }
}

#[async_trait]
impl PriceProvider for FakePrices {
    async fn current_price(&self) -> Result<CurrentPrice, SyncError> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        self.respond(|price| CurrentPrice {
            price,
            change_24h: 1.5,
            last_updated: quoted_at(),
            volume_24h: None,
            origin: PriceOrigin::Poll,
            error: false,
        })
        .await
    }

    async fn historical_data(&self, days: u32) -> Result<HistoricalSeries, SyncError> {
        self.history_days.lock().unwrap().push(days);
        self.respond(|price| {
            let end = quoted_at();
            HistoricalSeries::from_points(vec![
                PricePoint {
                    timestamp: end - chrono::Duration::days(days as i64),
                    price: price - 1_000.0,
                    volume: None,
                },
                PricePoint {
                    timestamp: end,
                    price,
                    volume: None,
                },
            ])
        })
        .await
    }
}

#[derive(Default)]
struct FakeMacro {
    delay: Duration,
    failure: Mutex<Option<Failure>>,
    calls: Mutex<Vec<(NaiveDate, NaiveDate)>>,
}

impl FakeMacro {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    fn fail_with(&self, failure: Failure) {
        *self.failure.lock().unwrap() = Some(failure);
    }

    fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    fn calls(&self) -> Vec<(NaiveDate, NaiveDate)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MacroSeriesProvider for FakeMacro {
    async fn macro_series(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MacroSeries, SyncError> {
        self.calls.lock().unwrap().push((start, end));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = *self.failure.lock().unwrap();
        if let Some(fail) = failure {
            return Err(fail());
        }
        Ok(MacroSeries::from_points(vec![
            MacroSeriesPoint {
                date: start,
                value: 21_000.0,
            },
            MacroSeriesPoint {
                date: end,
                value: 21_100.0,
            },
        ]))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        poll_interval: Duration::from_secs(30),
        macro_ttl: Duration::from_secs(60 * 60),
        ..CoordinatorConfig::default()
    }
}

fn live_feed(connector: &Arc<FakeConnector>) -> LiveFeedClient {
    LiveFeedClient::new(
        LiveFeedConfig {
            url: "ws://feed.test/ticker".into(),
            reconnect: ReconnectPolicy {
                jitter: false,
                ..ReconnectPolicy::default()
            },
            connect_timeout: Duration::from_secs(5),
        },
        connector.clone(),
    )
}

fn coordinator(
    config: CoordinatorConfig,
    prices: &Arc<FakePrices>,
    macros: &Arc<FakeMacro>,
    live: Option<LiveFeedClient>,
) -> SyncCoordinator {
    SyncCoordinator::new(
        config,
        prices.clone(),
        macros.clone(),
        live,
        DataCache::new(),
        StateStore::default(),
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ─── Coalescing ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_concurrent_price_syncs_share_one_fetch() {
    let prices = FakePrices::slow(Duration::from_millis(200));
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    let (first, second) = tokio::join!(sync.sync_price(), sync.sync_price());
    assert_ok!(first);
    assert_ok!(second);
    assert_eq!(prices.current_calls(), 1);
    assert_eq!(prices.history_days(), vec![30]);
    assert!(!sync.store().snapshot().price.status.is_loading);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_macro_syncs_share_one_fetch() {
    let prices = FakePrices::new();
    let macros = FakeMacro::slow(Duration::from_millis(200));
    let sync = coordinator(config(), &prices, &macros, None);

    let (first, second) = tokio::join!(sync.sync_macro(), sync.sync_macro());
    assert_ok!(first);
    assert_ok!(second);
    assert_eq!(macros.calls().len(), 1);
    let slice = sync.store().snapshot().macro_series;
    assert!(!slice.status.is_loading);
    assert_eq!(slice.data.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sync_for_other_timeframe_waits_for_in_flight() {
    let prices = FakePrices::slow(Duration::from_millis(200));
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    let background = sync.clone();
    let pending = tokio::spawn(async move { background.sync_price().await });
    settle().await;

    sync.store().set_timeframe(Timeframe::Year1);
    assert_ok!(sync.sync_price().await);
    assert_ok!(pending.await.unwrap());

    assert_eq!(prices.history_days(), vec![30, 365]);
    let price = sync.store().snapshot().price;
    assert_eq!(price.history_timeframe, Some(Timeframe::Year1));
}

#[tokio::test(start_paused = true)]
async fn test_history_for_deselected_timeframe_is_discarded() {
    let prices = FakePrices::slow(Duration::from_millis(200));
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    let background = sync.clone();
    let pending = tokio::spawn(async move { background.sync_price().await });
    settle().await;
    sync.store().set_timeframe(Timeframe::Week1);
    assert_ok!(pending.await.unwrap());

    let price = sync.store().snapshot().price;
    assert!(price.historical_data.is_empty());
    assert_eq!(price.history_timeframe, None);
    // The current quote is timeframe independent.
    assert!(price.current_price.is_some());
}

// ─── Failure handling ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_last_good_values() {
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    assert_ok!(sync.sync_price().await);
    let good = sync.store().snapshot().price;

    prices.fail_with(network_down);
    let err = assert_err!(sync.sync_price().await);
    assert_eq!(err.kind, ErrorKind::Network);

    let price = sync.store().snapshot().price;
    let current = price.current_price.as_ref().unwrap();
    assert_eq!(current.price, 50_000.0);
    assert!(current.error);
    assert_eq!(price.historical_data, good.historical_data);
    assert_eq!(price.status.error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));
    assert!(!price.status.is_loading);
    assert!(!price.should_show_error());

    prices.recover(51_000.0);
    assert_ok!(sync.sync_price().await);
    let price = sync.store().snapshot().price;
    let current = price.current_price.unwrap();
    assert_eq!(current.price, 51_000.0);
    assert!(!current.error);
    assert!(price.status.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_error_without_data_is_shown() {
    let prices = FakePrices::new();
    prices.fail_with(network_down);
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    assert_err!(sync.sync_price().await);
    let price = sync.store().snapshot().price;
    assert!(price.current_price.is_none());
    assert!(price.should_show_error());
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_halts_macro_polling_until_manual_success() {
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    macros.fail_with(missing_key);
    let sync = coordinator(
        CoordinatorConfig {
            macro_ttl: Duration::from_secs(10),
            ..config()
        },
        &prices,
        &macros,
        None,
    );

    sync.start().await;
    let status = sync.store().snapshot().macro_series.status;
    assert_eq!(status.error.map(|e| e.kind), Some(ErrorKind::Config));

    // Polls at 30s, 60s and 90s refresh prices but leave the macro domain alone.
    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(prices.current_calls(), 4);
    assert_eq!(macros.calls().len(), 1);

    macros.recover();
    assert_ok!(sync.sync_macro().await);
    assert_eq!(macros.calls().len(), 2);
    assert!(sync.store().snapshot().macro_series.status.error.is_none());

    // The cached series has expired by the 120s poll.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(macros.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_postpones_polling() {
    let prices = FakePrices::new();
    prices.fail_with(rate_limited);
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    sync.start().await;
    let err = sync.store().snapshot().price.status.error.unwrap();
    assert_eq!(err.kind, ErrorKind::RateLimit);
    assert_eq!(err.retry_after, Some(Duration::from_secs(60)));

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(prices.current_calls(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(prices.current_calls(), 2);
}

// ─── Timeframes and cache ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timeframe_change_resyncs_both_domains() {
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    let (price, macro_series) = sync.set_timeframe(Timeframe::Year1).await;
    assert_ok!(price);
    assert_ok!(macro_series);

    assert_eq!(prices.history_days(), vec![365]);
    let (start, end) = macros.calls()[0];
    assert_eq!((start, end), Timeframe::Year1.date_range(end));
    assert!(sync.cache().contains(&keys::macro_series(Timeframe::Year1)));

    let state = sync.store().snapshot();
    assert_eq!(state.ui.selected_timeframe, Timeframe::Year1);
    assert_eq!(state.price.history_timeframe, Some(Timeframe::Year1));
    assert_eq!(state.macro_series.timeframe, Some(Timeframe::Year1));
    assert_eq!(state.macro_series.data.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_macro_series_is_served_from_cache() {
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    assert_ok!(sync.sync_macro().await);
    assert_ok!(sync.sync_macro().await);
    assert_eq!(macros.calls().len(), 1);

    let _ = sync.set_timeframe(Timeframe::Week1).await;
    let _ = sync.set_timeframe(Timeframe::Days30).await;
    assert_eq!(macros.calls().len(), 2);

    let slice = sync.store().snapshot().macro_series;
    assert_eq!(slice.timeframe, Some(Timeframe::Days30));
    assert!(!slice.status.is_loading);
}

#[tokio::test(start_paused = true)]
async fn test_selecting_timeframe_in_store_triggers_resync() {
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);
    sync.start().await;

    sync.store().set_timeframe(Timeframe::Week1);
    settle().await;

    assert_eq!(prices.history_days(), vec![30, 7]);
    assert_eq!(
        sync.store().snapshot().price.history_timeframe,
        Some(Timeframe::Week1)
    );
}

// ─── Polling lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_polling_refreshes_until_shutdown() {
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);

    sync.start().await;
    sync.start().await;
    assert!(sync.is_running());
    assert_eq!(prices.current_calls(), 1);

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(prices.current_calls(), 3);

    sync.shutdown();
    assert!(!sync.is_running());
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(prices.current_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_auto_refresh_off_skips_polling() {
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, None);
    sync.store().set_auto_refresh(false);

    sync.start().await;
    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(prices.current_calls(), 1);

    sync.store().set_auto_refresh(true);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(prices.current_calls(), 2);
}

// ─── Live feed ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_live_tick_beats_slower_fetch() {
    let connector = FakeConnector::new();
    let frames = connector.accept();
    let prices = FakePrices::slow(Duration::from_millis(500));
    let macros = FakeMacro::new();
    let sync = coordinator(config(), &prices, &macros, Some(live_feed(&connector)));

    let starter = sync.clone();
    let started = tokio::spawn(async move { starter.start().await });
    settle().await;

    // The fetch began first; the tick arrives while it is still running.
    frames.send(Ok(ticker(51_000.0))).unwrap();
    settle().await;
    let current = sync.store().snapshot().price.current_price.unwrap();
    assert_eq!(current.price, 51_000.0);
    assert_eq!(current.origin, PriceOrigin::Live);

    started.await.unwrap();
    let price = sync.store().snapshot().price;
    let current = price.current_price.unwrap();
    assert_eq!(current.price, 51_000.0);
    assert_eq!(current.origin, PriceOrigin::Live);
    assert_eq!(price.history_timeframe, Some(Timeframe::Days30));
}

#[tokio::test(start_paused = true)]
async fn test_live_toggle_attaches_and_detaches() {
    let connector = FakeConnector::new();
    let frames = connector.accept();
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let feed = live_feed(&connector);
    let sync = coordinator(config(), &prices, &macros, Some(feed.clone()));

    sync.start().await;
    settle().await;
    assert_eq!(feed.subscriber_count(), 1);
    assert_eq!(
        sync.store().snapshot().live_feed.state,
        ConnectionState::Connected
    );

    frames.send(Ok(ticker(52_000.0))).unwrap();
    settle().await;
    let current = sync.store().snapshot().price.current_price.unwrap();
    assert_eq!(current.price, 52_000.0);
    assert_eq!(current.volume_24h, Some(1234.5));

    sync.set_live_enabled(false);
    settle().await;
    assert_eq!(feed.subscriber_count(), 0);
    assert_eq!(feed.state(), ConnectionState::Disconnected);
    let state = sync.store().snapshot();
    assert!(!state.ui.real_time_enabled);
    assert_eq!(state.live_feed.state, ConnectionState::Disconnected);

    // Polling keeps running without the feed.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(prices.current_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_live_toggle_applies_during_timeframe_resync() {
    let connector = FakeConnector::new();
    let _frames = connector.accept();
    let prices = FakePrices::slow(Duration::from_secs(5));
    let macros = FakeMacro::new();
    let feed = live_feed(&connector);
    let sync = coordinator(config(), &prices, &macros, Some(feed.clone()));

    sync.start().await;
    settle().await;
    assert_eq!(feed.subscriber_count(), 1);

    sync.store().set_timeframe(Timeframe::Week1);
    settle().await;
    assert_eq!(prices.history_days(), vec![30, 7]);

    sync.store().set_real_time_enabled(false);
    settle().await;
    assert_eq!(feed.subscriber_count(), 0);
    assert!(sync.store().snapshot().price.status.is_loading);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let price = sync.store().snapshot().price;
    assert!(!price.status.is_loading);
    assert_eq!(price.history_timeframe, Some(Timeframe::Week1));
}

#[tokio::test(start_paused = true)]
async fn test_live_feed_disabled_by_config() {
    let connector = FakeConnector::new();
    let _frames = connector.accept();
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let feed = live_feed(&connector);
    let sync = coordinator(
        CoordinatorConfig {
            live_feed_enabled: false,
            ..config()
        },
        &prices,
        &macros,
        Some(feed.clone()),
    );

    sync.start().await;
    sync.set_live_enabled(true);
    settle().await;
    assert_eq!(feed.subscriber_count(), 0);
    assert_eq!(connector.connect_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_detaches_live_feed() {
    let connector = FakeConnector::new();
    let _frames = connector.accept();
    let prices = FakePrices::new();
    let macros = FakeMacro::new();
    let feed = live_feed(&connector);
    let sync = coordinator(config(), &prices, &macros, Some(feed.clone()));

    sync.start().await;
    settle().await;
    assert_eq!(feed.state(), ConnectionState::Connected);

    sync.shutdown();
    settle().await;
    assert_eq!(feed.subscriber_count(), 0);
    assert_eq!(feed.state(), ConnectionState::Disconnected);
    assert_eq!(connector.close_count(), 1);
}
