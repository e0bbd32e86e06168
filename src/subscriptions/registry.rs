//! Interest key to listener mapping.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::types::{InterestKey, Subscription, SubscriptionId};

/// Snapshot of the listeners matching one record type.
///
/// Taken under the shared lock and used after it is released, so delivery
/// never blocks registry mutation.
#[derive(Debug, Default)]
pub struct Listeners {
    pub(crate) wildcard: Vec<Arc<Subscription>>,
    pub(crate) typed: Vec<Arc<Subscription>>,
}

impl Listeners {
    pub fn len(&self) -> usize {
        self.wildcard.len() + self.typed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wildcard.is_empty() && self.typed.is_empty()
    }

    /// Wildcard listeners first, then typed, each in registration order.
    pub(crate) fn into_delivery_order(self) -> Vec<Arc<Subscription>> {
        let mut all = self.wildcard;
        all.extend(self.typed);
        all
    }
}

/// Registry of active subscriptions keyed by interest.
///
/// A subscription requesting N types appears N times, once per key. Writers
/// take the exclusive lock; lookups take the shared lock. Once closed, the
/// registry stays empty.
#[derive(Default)]
pub struct SubscriptionRegistry {
    listeners: RwLock<HashMap<InterestKey, Vec<Arc<Subscription>>>>,

    /// Only flipped while the write lock is held.
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription under each key (wildcard if `keys` is empty).
    ///
    /// Returns false, and registers nothing, once the registry is closed.
    pub(crate) fn add(&self, subscription: Arc<Subscription>, keys: &[InterestKey]) -> bool {
        let mut listeners = self.listeners.write();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }

        if keys.is_empty() {
            listeners
                .entry(InterestKey::All)
                .or_default()
                .push(subscription);
            return true;
        }

        for key in keys {
            listeners
                .entry(key.clone())
                .or_default()
                .push(Arc::clone(&subscription));
        }
        true
    }

    /// Remove the subscription with `id` from each key (wildcard if empty).
    ///
    /// Returns how many entries were removed. Missing entries are ignored.
    pub fn remove(&self, id: SubscriptionId, keys: &[InterestKey]) -> usize {
        let mut listeners = self.listeners.write();
        let wildcard = [InterestKey::All];
        let keys = if keys.is_empty() { &wildcard[..] } else { keys };

        let mut removed = 0;
        for key in keys {
            if let Some(subs) = listeners.get_mut(key) {
                let before = subs.len();
                subs.retain(|sub| sub.id != id);
                removed += before - subs.len();

                if subs.is_empty() {
                    listeners.remove(key);
                }
            }
        }
        removed
    }

    /// Snapshot the wildcard listeners and those registered for `record_type`.
    pub fn lookup(&self, record_type: &str) -> Listeners {
        let listeners = self.listeners.read();

        let wildcard = listeners
            .get(&InterestKey::All)
            .cloned()
            .unwrap_or_default();
        let typed = listeners
            .get(&InterestKey::Type(record_type.to_string()))
            .cloned()
            .unwrap_or_default();

        Listeners { wildcard, typed }
    }

    /// Number of listeners registered under `key`.
    pub fn listener_count(&self, key: &InterestKey) -> usize {
        self.listeners.read().get(key).map_or(0, Vec::len)
    }

    /// Whether `id` is registered under any key.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.listeners
            .read()
            .values()
            .any(|subs| subs.iter().any(|sub| sub.id == id))
    }

    /// Total registrations across all keys.
    pub fn len(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Number of keys with at least one listener.
    pub fn key_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Drop every registration and refuse new ones. Used at teardown.
    ///
    /// Returns how many registrations were discarded.
    pub fn close(&self) -> usize {
        let mut listeners = self.listeners.write();
        self.closed.store(true, Ordering::SeqCst);
        let discarded = listeners.values().map(Vec::len).sum();
        listeners.clear();
        discarded
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
