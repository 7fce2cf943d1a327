//! `LiveFeedClient`: one shared streaming connection, many listeners.
//!
//! The first subscriber opens the connection and the last one closes it.
//! A background tokio task owns the socket; it reconnects with exponential
//! backoff and gives up after the policy's attempt cap. Every start or stop
//! bumps a generation counter so a task that outlived its session can never
//! touch the shared state again.

use super::subscriptions::{dispatch, ListenerError, SubscriberId, SubscriberRegistry, TickListener};
use super::{ConnectionState, FeedConnection, FeedConnector, FeedHealth, LiveFeedConfig};
use crate::domain::price::convert::parse_tick;
use crate::domain::price::PriceTick;
use crate::error::WsError;

use futures_util::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};

// ─── Shared state ────────────────────────────────────────────────────────────

struct FeedState {
    registry: SubscriberRegistry,
    connection: ConnectionState,
    attempts: u32,
    exhausted: bool,
    generation: u64,
    /// Dropping this stops the running task.
    shutdown: Option<oneshot::Sender<()>>,
}

struct Inner {
    config: LiveFeedConfig,
    connector: Arc<dyn FeedConnector>,
    state: Mutex<FeedState>,
    health: watch::Sender<FeedHealth>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, st: &FeedState) {
        self.health.send_replace(FeedHealth {
            state: st.connection,
            attempts: st.attempts,
            exhausted: st.exhausted,
        });
    }

    fn start(self: &Arc<Self>, st: &mut FeedState, runtime: &Handle) {
        st.generation += 1;
        st.attempts = 0;
        st.exhausted = false;
        st.connection = ConnectionState::Connecting;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        st.shutdown = Some(shutdown_tx);
        self.publish(st);

        tracing::info!(url = %self.config.url, generation = st.generation, "Opening live feed");
        let task = FeedTask {
            inner: Arc::downgrade(self),
            generation: st.generation,
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
        };
        runtime.spawn(task.run(shutdown_rx));
    }

    fn stop(&self, st: &mut FeedState) {
        st.generation += 1;
        st.shutdown = None;
        st.connection = ConnectionState::Disconnected;
        st.attempts = 0;
        st.exhausted = false;
        self.publish(st);
    }
}

// ─── Public LiveFeedClient ───────────────────────────────────────────────────

/// Shared live price feed.
///
/// Cheap to clone; all clones share one connection and one listener set.
#[derive(Clone)]
pub struct LiveFeedClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LiveFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFeedClient")
            .field("url", &self.inner.config.url)
            .field("health", &self.health())
            .finish()
    }
}

impl LiveFeedClient {
    /// Create a client. Does not connect until the first subscriber.
    pub fn new(config: LiveFeedConfig, connector: Arc<dyn FeedConnector>) -> Self {
        let (health, _) = watch::channel(FeedHealth::default());
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                state: Mutex::new(FeedState {
                    registry: SubscriberRegistry::default(),
                    connection: ConnectionState::Disconnected,
                    attempts: 0,
                    exhausted: false,
                    generation: 0,
                    shutdown: None,
                }),
                health,
            }),
        }
    }

    pub fn config(&self) -> &LiveFeedConfig {
        &self.inner.config
    }

    /// Register a listener.
    ///
    /// Opens the connection when the client is disconnected, including after
    /// reconnects were exhausted. Requires a tokio runtime in that case.
    pub fn subscribe<F>(&self, listener: F) -> Result<SubscriberId, WsError>
    where
        F: Fn(&PriceTick) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.subscribe_listener(Arc::new(listener))
    }

    pub fn subscribe_listener(&self, listener: TickListener) -> Result<SubscriberId, WsError> {
        let mut st = self.inner.lock();
        if st.connection != ConnectionState::Disconnected {
            return Ok(st.registry.insert(listener));
        }

        let runtime = Handle::try_current().map_err(|_| WsError::NoRuntime)?;
        let id = st.registry.insert(listener);
        self.inner.start(&mut st, &runtime);
        Ok(id)
    }

    /// Remove a listener. Closes the connection when none remain, cancelling
    /// any pending reconnect. Returns `false` for an unknown id.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut st = self.inner.lock();
        if !st.registry.remove(id) {
            return false;
        }
        if st.registry.is_empty() {
            tracing::info!("Last subscriber left, closing live feed");
            self.inner.stop(&mut st);
        }
        true
    }

    /// Drop every listener and close the connection.
    pub fn disconnect(&self) {
        let mut st = self.inner.lock();
        st.registry.clear();
        self.inner.stop(&mut st);
    }

    /// Force a fresh connection cycle with the attempt counter reset.
    ///
    /// No-op without subscribers or while a first connect is in progress.
    pub fn restart(&self) -> Result<(), WsError> {
        let mut st = self.inner.lock();
        if st.registry.is_empty() {
            return Ok(());
        }
        if st.connection == ConnectionState::Connecting {
            tracing::info!("Already connecting, skipping restart");
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| WsError::NoRuntime)?;
        tracing::info!("Manual live feed restart requested");
        st.shutdown = None;
        self.inner.start(&mut st, &runtime);
        Ok(())
    }

    /// Ticks as a stream. Dropping the stream unsubscribes.
    pub fn ticks(&self) -> Result<TickStream, WsError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |tick| {
            tx.send(tick.clone())
                .map_err(|_| ListenerError::from("tick stream receiver dropped"))
        })?;
        Ok(TickStream {
            id,
            rx,
            client: self.clone(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.health.borrow().state
    }

    pub fn health(&self) -> FeedHealth {
        *self.inner.health.borrow()
    }

    /// Receiver notified on every state, attempt or exhaustion change.
    pub fn watch_health(&self) -> watch::Receiver<FeedHealth> {
        self.inner.health.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.inner.lock().registry.contains(id)
    }
}

// ─── TickStream ──────────────────────────────────────────────────────────────

/// Stream of ticks backed by one listener registration.
#[derive(Debug)]
pub struct TickStream {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<PriceTick>,
    client: LiveFeedClient,
}

impl TickStream {
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Stream for TickStream {
    type Item = PriceTick;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for TickStream {
    fn drop(&mut self) {
        self.client.unsubscribe(self.id);
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

enum DisconnectReason {
    Requested,
    Lost(WsError),
}

struct FeedTask {
    inner: Weak<Inner>,
    generation: u64,
    connector: Arc<dyn FeedConnector>,
    config: LiveFeedConfig,
}

impl FeedTask {
    /// Run `f` under the lock, only if this task's session is still current.
    fn with_state<R>(&self, f: impl FnOnce(&Inner, &mut FeedState) -> R) -> Option<R> {
        let inner = self.inner.upgrade()?;
        let mut st = inner.lock();
        if st.generation != self.generation {
            return None;
        }
        Some(f(&inner, &mut st))
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            // ── 1. Attempt connection ────────────────────────────────────
            let connected = tokio::select! {
                _ = &mut shutdown => return,
                res = self.connector.connect(&self.config.url) => res,
            };

            // ── 2. Read until the connection breaks ──────────────────────
            let err = match connected {
                Ok(mut conn) => {
                    let opened = self.with_state(|inner, st| {
                        st.connection = ConnectionState::Connected;
                        st.attempts = 0;
                        inner.publish(st);
                    });
                    if opened.is_none() {
                        conn.close().await;
                        return;
                    }
                    tracing::info!(url = %self.config.url, "Live feed connected");

                    match self.read_frames(conn.as_mut(), &mut shutdown).await {
                        DisconnectReason::Requested => {
                            conn.close().await;
                            return;
                        }
                        DisconnectReason::Lost(e) => e,
                    }
                }
                Err(e) => e,
            };
            tracing::warn!(url = %self.config.url, "Live feed connection failed: {}", err);

            // ── 3. Backoff or give up ────────────────────────────────────
            let Some(Some(delay)) = self.with_state(|inner, st| self.schedule_reconnect(inner, st))
            else {
                return;
            };

            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn read_frames(
        &self,
        conn: &mut dyn FeedConnection,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> DisconnectReason {
        loop {
            let frame = tokio::select! {
                _ = &mut *shutdown => return DisconnectReason::Requested,
                frame = conn.next_frame() => frame,
            };

            match frame {
                Some(Ok(text)) => match decode_frame(&text) {
                    Ok(tick) => {
                        let Some(listeners) = self.with_state(|_, st| st.registry.snapshot()) else {
                            return DisconnectReason::Requested;
                        };
                        dispatch(&listeners, &tick);
                    }
                    Err(e) => {
                        tracing::warn!("Dropping live feed frame: {}", e);
                    }
                },
                Some(Err(e)) => return DisconnectReason::Lost(e),
                None => {
                    return DisconnectReason::Lost(WsError::Closed {
                        code: None,
                        reason: "Stream ended".into(),
                    })
                }
            }
        }
    }

    /// Count the failure and return the backoff delay, or `None` once the
    /// attempt cap is exceeded.
    fn schedule_reconnect(&self, inner: &Inner, st: &mut FeedState) -> Option<Duration> {
        st.attempts += 1;
        let policy = &self.config.reconnect;

        if !policy.allows(st.attempts) {
            st.connection = ConnectionState::Disconnected;
            st.exhausted = true;
            st.shutdown = None;
            inner.publish(st);
            tracing::error!(
                attempts = st.attempts,
                max = policy.max_attempts,
                "Live feed reconnect attempts exhausted"
            );
            return None;
        }

        let delay = policy.delay_for_attempt(st.attempts);
        st.connection = ConnectionState::Reconnecting;
        inner.publish(st);
        tracing::info!(
            attempt = st.attempts,
            max = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling live feed reconnect"
        );
        Some(delay)
    }
}

fn decode_frame(text: &str) -> Result<PriceTick, WsError> {
    parse_tick(text).map_err(|e| WsError::DeserializationError(e.to_string()))
}
