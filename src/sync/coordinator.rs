//! `SyncCoordinator`: drives fetchers, polling and the live feed into the
//! state store.
//!
//! Each data domain has at most one sync in flight. A request for the same
//! timeframe joins the in-flight one; a request for another timeframe waits for
//! it to settle and then starts its own. The work runs on its own task, so a
//! caller that stops waiting never leaves a domain stuck in `is_loading`.

use super::source::{MacroSeriesProvider, PriceProvider};
use crate::cache::{keys, CachedData, DataCache};
use crate::config::SyncConfig;
use crate::domain::macro_series::SeriesMetadata;
use crate::domain::price::CurrentPrice;
use crate::error::{ErrorKind, SyncError};
use crate::shared::{RevisionCounter, Timeframe};
use crate::store::{DashboardState, DomainError, StateStore};
use crate::ws::{FeedHealth, LiveFeedClient, SubscriberId};

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Result of one domain sync, shared by every coalesced caller.
pub type SyncOutcome = Result<(), DomainError>;

type SharedSync = Shared<BoxFuture<'static, SyncOutcome>>;

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub macro_ttl: Duration,
    /// Master switch for the live feed path. When off, polling only.
    pub live_feed_enabled: bool,
    pub metadata: SeriesMetadata,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            macro_ttl: Duration::from_secs(60 * 60),
            live_feed_enabled: true,
            metadata: SeriesMetadata::default(),
        }
    }
}

impl From<&SyncConfig> for CoordinatorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            macro_ttl: config.macro_ttl,
            live_feed_enabled: config.live_feed_enabled,
            metadata: SeriesMetadata {
                series_id: config.series_id.clone(),
                ..SeriesMetadata::default()
            },
        }
    }
}

// ─── Per-domain control ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Price,
    Macro,
}

impl Domain {
    fn as_str(&self) -> &'static str {
        match self {
            Domain::Price => "price",
            Domain::Macro => "macro",
        }
    }
}

struct InFlight {
    timeframe: Timeframe,
    id: u64,
    fut: SharedSync,
}

#[derive(Default)]
struct DomainControl {
    inflight: Option<InFlight>,
    next_id: u64,
    /// Set by a configuration error. Polling skips the domain until a
    /// manual sync succeeds.
    halted: bool,
    /// Set by a rate limit with a retry hint.
    postponed_until: Option<Instant>,
}

enum Step {
    Join(SharedSync),
    Wait(SharedSync),
    Run(SharedSync),
}

/// Clears the in-flight slot when the sync task ends, even on panic.
struct FlightGuard {
    inner: Arc<Inner>,
    domain: Domain,
    id: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut ctl = self.inner.control(self.domain);
        if ctl.inflight.as_ref().map(|f| f.id) == Some(self.id) {
            ctl.inflight = None;
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    tasks: Vec<JoinHandle<()>>,
    live_subscription: Option<SubscriberId>,
}

// ─── Inner ───────────────────────────────────────────────────────────────────

struct Inner {
    config: CoordinatorConfig,
    prices: Arc<dyn PriceProvider>,
    macro_series: Arc<dyn MacroSeriesProvider>,
    live: Option<LiveFeedClient>,
    cache: DataCache,
    store: StateStore,
    revisions: RevisionCounter,
    price_ctl: Mutex<DomainControl>,
    macro_ctl: Mutex<DomainControl>,
    lifecycle: Mutex<Lifecycle>,
}

impl Inner {
    fn control(&self, domain: Domain) -> MutexGuard<'_, DomainControl> {
        let ctl = match domain {
            Domain::Price => &self.price_ctl,
            Domain::Macro => &self.macro_ctl,
        };
        ctl.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sync_price_once(&self, timeframe: Timeframe) -> SyncOutcome {
        self.store.begin_price_sync();
        let revision = self.revisions.next();

        let (current, history) = tokio::join!(
            self.prices.current_price(),
            self.prices.historical_data(timeframe.days())
        );

        let mut failure: Option<SyncError> = None;
        match current {
            Ok(price) => {
                self.store.apply_current_price(price, revision);
            }
            Err(e) => failure = Some(e),
        }
        match history {
            Ok(series) if self.store.selected_timeframe() == timeframe => {
                self.store.apply_history(series, timeframe);
            }
            Ok(_) => {
                tracing::debug!(timeframe = %timeframe, "Discarding history for a deselected timeframe");
            }
            Err(e) if failure.is_none() => failure = Some(e),
            Err(e) => tracing::warn!("Historical price fetch also failed: {}", e),
        }

        let error = failure.as_ref().map(DomainError::from);
        self.store.finish_price_sync(error.clone());
        self.record_outcome(Domain::Price, error.as_ref());
        error.map_or(Ok(()), Err)
    }

    async fn sync_macro_once(&self, timeframe: Timeframe) -> SyncOutcome {
        let key = keys::macro_series(timeframe);
        if let Some(CachedData::MacroSeries(series)) = self.cache.get(&key) {
            tracing::debug!(key = %key, "Cache hit");
            if !self.store.macro_is_current(timeframe) && self.store.selected_timeframe() == timeframe {
                self.store.apply_macro_series(series, timeframe);
                self.store.finish_macro_sync(None);
            }
            self.record_outcome(Domain::Macro, None);
            return Ok(());
        }

        self.store.begin_macro_sync();
        let (start, end) = timeframe.date_range(Utc::now().date_naive());
        let error = match self.macro_series.macro_series(start, end).await {
            Ok(series) => {
                self.cache
                    .set(key, CachedData::MacroSeries(series.clone()), self.config.macro_ttl);
                if self.store.selected_timeframe() == timeframe {
                    self.store.apply_macro_series(series, timeframe);
                } else {
                    tracing::debug!(timeframe = %timeframe, "Discarding macro series for a deselected timeframe");
                }
                None
            }
            Err(e) => Some(DomainError::from(&e)),
        };

        self.store.finish_macro_sync(error.clone());
        self.record_outcome(Domain::Macro, error.as_ref());
        error.map_or(Ok(()), Err)
    }

    fn record_outcome(&self, domain: Domain, error: Option<&DomainError>) {
        let mut ctl = self.control(domain);
        let Some(err) = error else {
            if ctl.halted {
                tracing::info!(domain = domain.as_str(), "Resuming automatic polling");
            }
            ctl.halted = false;
            ctl.postponed_until = None;
            return;
        };

        match err.kind {
            ErrorKind::Config => {
                if !ctl.halted {
                    tracing::error!(
                        domain = domain.as_str(),
                        "Halting automatic polling on configuration error: {}",
                        err.message
                    );
                }
                ctl.halted = true;
            }
            ErrorKind::RateLimit => {
                if let Some(delay) = err.retry_after {
                    tracing::warn!(
                        domain = domain.as_str(),
                        retry_after_ms = delay.as_millis() as u64,
                        "Postponing polling after rate limit"
                    );
                    ctl.postponed_until = Some(Instant::now() + delay);
                }
            }
            ErrorKind::Network => {
                tracing::warn!(domain = domain.as_str(), "Sync failed: {}", err.message);
            }
            ErrorKind::Upstream => {
                tracing::error!(
                    domain = domain.as_str(),
                    "Upstream rejected sync: {}",
                    err.message
                );
            }
        }
    }

    fn should_poll(&self, domain: Domain) -> bool {
        let mut ctl = self.control(domain);
        if ctl.halted {
            return false;
        }
        match ctl.postponed_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                ctl.postponed_until = None;
                true
            }
            None => true,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for task in lifecycle.tasks.drain(..) {
            task.abort();
        }
        if let (Some(live), Some(id)) = (&self.live, lifecycle.live_subscription.take()) {
            live.unsubscribe(id);
        }
    }
}

// ─── Public SyncCoordinator ──────────────────────────────────────────────────

/// Sole writer of the store's data slices.
///
/// Cheap to clone; clones share state. Background tasks hold only weak
/// references, so dropping the last clone stops them.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("config", &self.inner.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        prices: Arc<dyn PriceProvider>,
        macro_series: Arc<dyn MacroSeriesProvider>,
        live: Option<LiveFeedClient>,
        cache: DataCache,
        store: StateStore,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                prices,
                macro_series,
                live,
                cache,
                store,
                revisions: RevisionCounter::new(),
                price_ctl: Mutex::new(DomainControl::default()),
                macro_ctl: Mutex::new(DomainControl::default()),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn cache(&self) -> &DataCache {
        &self.inner.cache
    }

    pub fn live_feed(&self) -> Option<&LiveFeedClient> {
        self.inner.live.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle().running
    }

    /// Activate: run the initial syncs, then keep polling, follow UI changes
    /// and attach the live feed if enabled. Idempotent.
    pub async fn start(&self) {
        {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.running {
                return;
            }
            lifecycle.running = true;

            let weak = Arc::downgrade(&self.inner);
            lifecycle.tasks.push(tokio::spawn(poll_loop(
                weak.clone(),
                self.inner.config.poll_interval,
            )));
            lifecycle
                .tasks
                .push(tokio::spawn(watch_ui(weak.clone(), self.inner.store.subscribe())));
            if let Some(live) = &self.inner.live {
                lifecycle
                    .tasks
                    .push(tokio::spawn(watch_feed(weak, live.watch_health())));
            }
        }
        tracing::info!(
            poll_interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            "Sync coordinator started"
        );

        self.inner
            .store
            .set_macro_metadata(self.inner.config.metadata.clone());
        self.apply_live_toggle(self.inner.store.real_time_enabled());
        let _ = self.sync_all().await;
    }

    /// Stop polling and detach from the live feed. In-flight fetches finish
    /// and still write their results.
    pub fn shutdown(&self) {
        let subscription = {
            let mut lifecycle = self.inner.lifecycle();
            if !lifecycle.running {
                return;
            }
            lifecycle.running = false;
            for task in lifecycle.tasks.drain(..) {
                task.abort();
            }
            lifecycle.live_subscription.take()
        };
        if let (Some(live), Some(id)) = (&self.inner.live, subscription) {
            live.unsubscribe(id);
        }
        tracing::info!("Sync coordinator stopped");
    }

    /// Sync the price domain for the selected timeframe.
    pub async fn sync_price(&self) -> SyncOutcome {
        let timeframe = self.inner.store.selected_timeframe();
        self.coalesced(Domain::Price, timeframe).await
    }

    /// Sync the macro domain for the selected timeframe.
    pub async fn sync_macro(&self) -> SyncOutcome {
        let timeframe = self.inner.store.selected_timeframe();
        self.coalesced(Domain::Macro, timeframe).await
    }

    pub async fn sync_all(&self) -> (SyncOutcome, SyncOutcome) {
        tokio::join!(self.sync_price(), self.sync_macro())
    }

    /// Select a timeframe and resync both domains for it.
    pub async fn set_timeframe(&self, timeframe: Timeframe) -> (SyncOutcome, SyncOutcome) {
        self.inner.store.set_timeframe(timeframe);
        self.sync_all().await
    }

    /// Toggle real-time updates. Polling continues either way.
    pub fn set_live_enabled(&self, enabled: bool) {
        self.inner.store.set_real_time_enabled(enabled);
        self.apply_live_toggle(enabled);
    }

    fn apply_live_toggle(&self, enabled: bool) {
        let Some(live) = &self.inner.live else {
            return;
        };
        let mut lifecycle = self.inner.lifecycle();

        if !(enabled && lifecycle.running && self.inner.config.live_feed_enabled) {
            if let Some(id) = lifecycle.live_subscription.take() {
                live.unsubscribe(id);
                tracing::info!("Live price updates detached");
            }
            return;
        }
        if lifecycle.live_subscription.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let subscribed = live.subscribe(move |tick| {
            if let Some(inner) = weak.upgrade() {
                let revision = inner.revisions.next();
                inner
                    .store
                    .apply_current_price(CurrentPrice::from(tick), revision);
            }
            Ok(())
        });
        match subscribed {
            Ok(id) => {
                lifecycle.live_subscription = Some(id);
                tracing::info!("Live price updates attached");
            }
            Err(e) => tracing::warn!("Could not attach live feed: {}", e),
        }
    }

    async fn coalesced(&self, domain: Domain, timeframe: Timeframe) -> SyncOutcome {
        loop {
            let step = {
                let mut ctl = self.inner.control(domain);
                let existing = ctl
                    .inflight
                    .as_ref()
                    .map(|f| (f.timeframe == timeframe, f.fut.clone()));
                match existing {
                    Some((true, fut)) => Step::Join(fut),
                    Some((false, fut)) => Step::Wait(fut),
                    None => Step::Run(self.start_flight(&mut ctl, domain, timeframe)),
                }
            };

            match step {
                Step::Join(fut) => {
                    tracing::debug!(
                        domain = domain.as_str(),
                        timeframe = %timeframe,
                        "Coalesced into in-flight sync"
                    );
                    return fut.await;
                }
                Step::Wait(fut) => {
                    let _ = fut.await;
                }
                Step::Run(fut) => return fut.await,
            }
        }
    }

    /// Spawn the sync task and register it. Caller holds the domain lock.
    fn start_flight(
        &self,
        ctl: &mut DomainControl,
        domain: Domain,
        timeframe: Timeframe,
    ) -> SharedSync {
        ctl.next_id += 1;
        let id = ctl.next_id;
        let guard = FlightGuard {
            inner: Arc::clone(&self.inner),
            domain,
            id,
        };

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match domain {
                Domain::Price => inner.sync_price_once(timeframe).await,
                Domain::Macro => inner.sync_macro_once(timeframe).await,
            }
        });

        let fut = async move {
            handle.await.unwrap_or_else(|e| {
                Err(DomainError {
                    kind: ErrorKind::Upstream,
                    message: format!("Sync task failed: {}", e),
                    retry_after: None,
                })
            })
        }
        .boxed()
        .shared();

        ctl.inflight = Some(InFlight {
            timeframe,
            id,
            fut: fut.clone(),
        });
        fut
    }
}

// ─── Background tasks ────────────────────────────────────────────────────────

async fn poll_loop(weak: Weak<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if !inner.store.auto_refresh() {
            continue;
        }

        let coordinator = SyncCoordinator { inner };
        let poll_price = coordinator.inner.should_poll(Domain::Price);
        let poll_macro = coordinator.inner.should_poll(Domain::Macro);
        tokio::join!(
            async {
                if poll_price {
                    let _ = coordinator.sync_price().await;
                }
            },
            async {
                if poll_macro {
                    let _ = coordinator.sync_macro().await;
                }
            }
        );
    }
}

/// Resync on timeframe changes and follow the real-time toggle.
async fn watch_ui(weak: Weak<Inner>, mut rx: watch::Receiver<DashboardState>) {
    let (mut timeframe, mut real_time) = {
        let state = rx.borrow_and_update();
        (state.ui.selected_timeframe, state.ui.real_time_enabled)
    };

    while rx.changed().await.is_ok() {
        let (next_timeframe, next_real_time) = {
            let state = rx.borrow_and_update();
            (state.ui.selected_timeframe, state.ui.real_time_enabled)
        };
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let coordinator = SyncCoordinator { inner };

        if next_real_time != real_time {
            real_time = next_real_time;
            coordinator.apply_live_toggle(real_time);
        }
        if next_timeframe != timeframe {
            timeframe = next_timeframe;
            tracing::debug!(timeframe = %timeframe, "Timeframe changed");
            tokio::spawn(async move {
                let _ = coordinator.sync_all().await;
            });
        }
    }
}

/// Mirror live feed health into the store.
async fn watch_feed(weak: Weak<Inner>, mut rx: watch::Receiver<FeedHealth>) {
    loop {
        let health = *rx.borrow_and_update();
        match weak.upgrade() {
            Some(inner) => inner.store.set_live_feed(health),
            None => return,
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
