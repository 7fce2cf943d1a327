//! Expiring key/value cache with per-entry TTL.
//!
//! Entries are readable only while `now - stored_at < ttl`. Expired entries
//! are dropped lazily by [`ExpiringCache::get`] and, when a tokio runtime is
//! available, by a deferred purge task scheduled on every `set`. The purge is
//! tagged with the entry's generation so it never removes a newer value
//! written under the same key.
//!
//! All operations are synchronous. Cloning the cache shares its storage.

use crate::domain::macro_series::MacroSeries;
use crate::domain::price::{CurrentPrice, HistoricalSeries};
use crate::shared::Timeframe;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Cache keys, one per request signature.
pub mod keys {
    use super::Timeframe;

    pub const PRICE_CURRENT: &str = "price-current";

    pub fn price_history(days: u32) -> String {
        format!("price-history-{}", days)
    }

    pub fn macro_series(timeframe: Timeframe) -> String {
        format!("macro-{}", timeframe.as_str())
    }
}

/// Values held by the shared data cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedData {
    CurrentPrice(CurrentPrice),
    History(HistoricalSeries),
    MacroSeries(MacroSeries),
}

/// The process-wide cache shared by all fetchers.
pub type DataCache = ExpiringCache<CachedData>;

// ─── Entry ───────────────────────────────────────────────────────────────────

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Duration,
    generation: u64,
    purge: Option<AbortHandle>,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }

    fn cancel_purge(&mut self) {
        if let Some(handle) = self.purge.take() {
            handle.abort();
        }
    }
}

/// Point-in-time view of one entry, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStats {
    pub key: String,
    pub age: Duration,
    pub ttl: Duration,
    pub remaining: Duration,
}

struct CacheInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_generation: u64,
}

// ─── ExpiringCache ───────────────────────────────────────────────────────────

pub struct ExpiringCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
}

impl<V> Clone for ExpiringCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }
}

impl<V> std::fmt::Debug for ExpiringCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("len", &self.len())
            .finish()
    }
}

impl<V: Clone + Send + 'static> ExpiringCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous entry and resetting
    /// its expiry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let mut inner = self.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;

        if let Some(mut old) = inner.entries.remove(&key) {
            old.cancel_purge();
        }

        let purge = schedule_purge(Arc::downgrade(&self.inner), key.clone(), generation, ttl);
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                generation,
                purge,
            },
        );
    }

    /// Return the value if present and unexpired. An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let fresh = inner.entries.get(key)?.is_fresh(Instant::now());
        if fresh {
            return inner.entries.get(key).map(|e| e.value.clone());
        }
        if let Some(mut expired) = inner.entries.remove(key) {
            expired.cancel_purge();
        }
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl<V> ExpiringCache<V> {
    /// Remove `key`. Returns whether an entry (fresh or expired) was present.
    pub fn delete(&self, key: &str) -> bool {
        match self.lock().entries.remove(key) {
            Some(mut entry) => {
                entry.cancel_purge();
                true
            }
            None => false,
        }
    }

    /// Remove every entry and cancel all pending purges.
    pub fn clear(&self) {
        let mut inner = self.lock();
        for (_, mut entry) in inner.entries.drain() {
            entry.cancel_purge();
        }
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Vec<EntryStats> {
        let now = Instant::now();
        let inner = self.lock();
        let mut stats: Vec<EntryStats> = inner
            .entries
            .iter()
            .map(|(key, entry)| {
                let age = now.saturating_duration_since(entry.stored_at);
                EntryStats {
                    key: key.clone(),
                    age,
                    ttl: entry.ttl,
                    remaining: entry.ttl.saturating_sub(age),
                }
            })
            .collect();
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        stats
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Drop for CacheInner<V> {
    fn drop(&mut self) {
        for entry in self.entries.values_mut() {
            entry.cancel_purge();
        }
    }
}

/// Spawn the deferred purge for one entry. No-op outside a tokio runtime;
/// lazy expiry on `get` still applies.
fn schedule_purge<V: Send + 'static>(
    inner: Weak<Mutex<CacheInner<V>>>,
    key: String,
    generation: u64,
    ttl: Duration,
) -> Option<AbortHandle> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let task = handle.spawn(async move {
        tokio::time::sleep(ttl).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let matches = guard
            .entries
            .get(&key)
            .is_some_and(|e| e.generation == generation);
        if matches {
            guard.entries.remove(&key);
            tracing::debug!(key = %key, "Purged expired cache entry");
        }
    });
    Some(task.abort_handle())
}
