//! Tick listener registry and fault-isolated dispatch.

use crate::domain::price::PriceTick;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Error a listener may return. Logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked synchronously for every parsed tick.
pub type TickListener = Arc<dyn Fn(&PriceTick) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Ordered set of listeners. Iteration order is registration order.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    entries: Vec<(SubscriberId, TickListener)>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("ids", &self.entries.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .finish()
    }
}

impl SubscriberRegistry {
    pub fn insert(&mut self, listener: TickListener) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Cheap copy of the current listeners, so delivery can run unlocked.
    pub fn snapshot(&self) -> Vec<(SubscriberId, TickListener)> {
        self.entries.clone()
    }
}

/// Deliver `tick` to every listener in order.
///
/// A listener that errors or panics is logged and skipped. Returns the number
/// of listeners that failed.
pub fn dispatch(listeners: &[(SubscriberId, TickListener)], tick: &PriceTick) -> usize {
    let mut failed = 0;
    for (id, listener) in listeners {
        match catch_unwind(AssertUnwindSafe(|| listener(tick))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed += 1;
                tracing::warn!(subscriber = %id, "Tick listener failed: {}", e);
            }
            Err(_) => {
                failed += 1;
                tracing::warn!(subscriber = %id, "Tick listener panicked");
            }
        }
    }
    failed
}
