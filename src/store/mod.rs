//! Dashboard state store.
//!
//! One [`DashboardState`] behind a `tokio::sync::watch` channel. Views call
//! [`StateStore::subscribe`] and re-render on change. Data slices are written
//! only by the sync coordinator (crate-private writers); the UI slice has
//! public setters for UI controls.

use crate::domain::macro_series::{MacroSeries, SeriesMetadata};
use crate::domain::price::{CurrentPrice, HistoricalSeries};
use crate::error::{ErrorKind, SyncError};
use crate::shared::{Revision, Timeframe};
use crate::ws::{ConnectionState, FeedHealth};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Cloneable snapshot of a sync failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainError {
    pub kind: ErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl From<&SyncError> for DomainError {
    fn from(err: &SyncError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retry_after: err.retry_after(),
        }
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

/// Loading/error/timestamp state of one data domain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub is_loading: bool,
    pub error: Option<DomainError>,
    pub last_updated: Option<DateTime<Utc>>,
}

// ─── Slices ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSlice {
    pub current_price: Option<CurrentPrice>,
    pub historical_data: HistoricalSeries,
    /// Timeframe the history was fetched for.
    pub history_timeframe: Option<Timeframe>,
    pub status: SyncStatus,
    /// Revision of the accepted `current_price`.
    pub revision: Revision,
}

impl PriceSlice {
    pub fn has_data(&self) -> bool {
        self.current_price.is_some() || !self.historical_data.is_empty()
    }

    /// Errors replace the view only when there is nothing stale to show.
    pub fn should_show_error(&self) -> bool {
        self.status.error.is_some() && !self.has_data()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroSlice {
    pub data: MacroSeries,
    pub metadata: SeriesMetadata,
    /// Timeframe the data was fetched for.
    pub timeframe: Option<Timeframe>,
    pub status: SyncStatus,
}

impl MacroSlice {
    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn should_show_error(&self) -> bool {
        self.status.error.is_some() && !self.has_data()
    }
}

/// Chart rendering style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Line,
    Area,
    Candle,
}

/// UI-only selections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSlice {
    pub selected_timeframe: Timeframe,
    pub chart_type: ChartType,
    pub real_time_enabled: bool,
    pub auto_refresh: bool,
}

impl Default for UiSlice {
    fn default() -> Self {
        Self {
            selected_timeframe: Timeframe::default(),
            chart_type: ChartType::default(),
            real_time_enabled: true,
            auto_refresh: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveFeedSlice {
    pub state: ConnectionState,
    /// Reconnects exhausted; data arrives by polling only.
    pub degraded: bool,
}

impl From<FeedHealth> for LiveFeedSlice {
    fn from(health: FeedHealth) -> Self {
        Self {
            state: health.state,
            degraded: health.is_degraded(),
        }
    }
}

/// Everything the dashboard renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub price: PriceSlice,
    pub macro_series: MacroSlice,
    pub ui: UiSlice,
    pub live_feed: LiveFeedSlice,
}

// ─── StateStore ──────────────────────────────────────────────────────────────

/// Shared handle to the dashboard state. Cloning shares the state.
#[derive(Debug, Clone)]
pub struct StateStore {
    tx: Arc<watch::Sender<DashboardState>>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DashboardState::default())
    }
}

impl StateStore {
    pub fn new(initial: DashboardState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> DashboardState {
        self.tx.borrow().clone()
    }

    /// Receiver that is notified on every accepted change.
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.tx.subscribe()
    }

    /// Reset both data domains. UI selections and feed status are kept.
    pub fn reset(&self) {
        self.tx.send_modify(|state| {
            let metadata = state.macro_series.metadata.clone();
            state.price = PriceSlice::default();
            state.macro_series = MacroSlice {
                metadata,
                ..MacroSlice::default()
            };
        });
    }

    // ── UI selections ────────────────────────────────────────────────────

    pub fn selected_timeframe(&self) -> Timeframe {
        self.tx.borrow().ui.selected_timeframe
    }

    pub fn real_time_enabled(&self) -> bool {
        self.tx.borrow().ui.real_time_enabled
    }

    pub fn auto_refresh(&self) -> bool {
        self.tx.borrow().ui.auto_refresh
    }

    pub fn set_timeframe(&self, timeframe: Timeframe) {
        self.tx.send_if_modified(|state| {
            replace_if_changed(&mut state.ui.selected_timeframe, timeframe)
        });
    }

    pub fn set_chart_type(&self, chart_type: ChartType) {
        self.tx
            .send_if_modified(|state| replace_if_changed(&mut state.ui.chart_type, chart_type));
    }

    pub fn set_real_time_enabled(&self, enabled: bool) {
        self.tx.send_if_modified(|state| {
            replace_if_changed(&mut state.ui.real_time_enabled, enabled)
        });
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.tx
            .send_if_modified(|state| replace_if_changed(&mut state.ui.auto_refresh, enabled));
    }

    // ── Price domain writers ─────────────────────────────────────────────

    pub(crate) fn begin_price_sync(&self) {
        self.tx.send_modify(|state| state.price.status.is_loading = true);
    }

    /// Accept `price` only if `revision` is newer than the displayed one and
    /// the quote is not older than it. Returns whether it was written.
    pub(crate) fn apply_current_price(&self, price: CurrentPrice, revision: Revision) -> bool {
        let accepted = self.tx.send_if_modified(|state| {
            let slice = &mut state.price;
            if revision <= slice.revision {
                return false;
            }
            if let Some(current) = &slice.current_price {
                if price.last_updated < current.last_updated {
                    return false;
                }
            }
            slice.current_price = Some(price);
            slice.revision = revision;
            true
        });
        if !accepted {
            tracing::debug!(revision = revision.value(), "Discarded stale price write");
        }
        accepted
    }

    pub(crate) fn apply_history(&self, series: HistoricalSeries, timeframe: Timeframe) {
        self.tx.send_modify(|state| {
            state.price.historical_data = series;
            state.price.history_timeframe = Some(timeframe);
        });
    }

    /// Close a price sync. On error the last good values stay and are
    /// flagged; on success the error is cleared.
    pub(crate) fn finish_price_sync(&self, error: Option<DomainError>) {
        self.tx.send_modify(|state| {
            let slice = &mut state.price;
            slice.status.is_loading = false;
            match error {
                Some(err) => {
                    if let Some(current) = slice.current_price.as_mut() {
                        current.error = true;
                    }
                    slice.status.error = Some(err);
                }
                None => {
                    if let Some(current) = slice.current_price.as_mut() {
                        current.error = false;
                    }
                    slice.status.error = None;
                    slice.status.last_updated = Some(Utc::now());
                }
            }
        });
    }

    // ── Macro domain writers ─────────────────────────────────────────────

    pub(crate) fn begin_macro_sync(&self) {
        self.tx
            .send_modify(|state| state.macro_series.status.is_loading = true);
    }

    /// Macro data for `timeframe` is displayed and healthy.
    pub(crate) fn macro_is_current(&self, timeframe: Timeframe) -> bool {
        let state = self.tx.borrow();
        let slice = &state.macro_series;
        slice.timeframe == Some(timeframe) && slice.status.error.is_none() && !slice.status.is_loading
    }

    pub(crate) fn apply_macro_series(&self, series: MacroSeries, timeframe: Timeframe) {
        self.tx.send_modify(|state| {
            state.macro_series.data = series;
            state.macro_series.timeframe = Some(timeframe);
        });
    }

    pub(crate) fn set_macro_metadata(&self, metadata: SeriesMetadata) {
        self.tx
            .send_if_modified(|state| replace_if_changed(&mut state.macro_series.metadata, metadata));
    }

    pub(crate) fn finish_macro_sync(&self, error: Option<DomainError>) {
        self.tx.send_modify(|state| {
            let status = &mut state.macro_series.status;
            status.is_loading = false;
            match error {
                Some(err) => status.error = Some(err),
                None => {
                    status.error = None;
                    status.last_updated = Some(Utc::now());
                }
            }
        });
    }

    // ── Live feed status ─────────────────────────────────────────────────

    pub(crate) fn set_live_feed(&self, health: FeedHealth) {
        let slice = LiveFeedSlice::from(health);
        self.tx
            .send_if_modified(|state| replace_if_changed(&mut state.live_feed, slice));
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
