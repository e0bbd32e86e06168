//! Subscription types for live record delivery.

use crate::types::Record;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::manager::ReaperCommand;
use super::registry::SubscriptionRegistry;

/// Configuration for subscriptions and broadcast delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Max buffered records per subscriber (0 is treated as 1).
    /// Default: 1000
    pub buffer_size: usize,

    /// How long delivery waits for space in a full buffer before dropping.
    /// Default: 100ms
    pub send_timeout_ms: u64,
}

impl SubscriptionConfig {
    /// Queue capacity actually allocated per subscriber.
    ///
    /// Never zero: a zero-capacity queue only hands a record over while its
    /// reader is blocked in `recv`.
    pub fn capacity(&self) -> usize {
        self.buffer_size.max(1)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            send_timeout_ms: 100,
        }
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        SubscriptionId(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing key a subscription is registered under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InterestKey {
    /// Every record, regardless of type.
    All,
    /// Records of one type.
    Type(String),
}

impl fmt::Display for InterestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterestKey::All => write!(f, "*"),
            InterestKey::Type(t) => write!(f, "{}", t),
        }
    }
}

/// Turn a requested type set into registry keys.
///
/// An empty set means the wildcard. Duplicates are collapsed, keeping the
/// first occurrence's position.
pub fn interest_keys<I, S>(types: I) -> Vec<InterestKey>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut keys: Vec<InterestKey> = Vec::new();
    for t in types {
        let key = InterestKey::Type(t.into());
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    if keys.is_empty() {
        keys.push(InterestKey::All);
    }
    keys
}

/// Lifecycle of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered and receiving.
    Active,
    /// Cancel signaled, removal pending.
    Cancelling,
    /// No longer in any registry collection.
    Removed,
}

const ACTIVE: u8 = 0;
const CANCELLING: u8 = 1;
const REMOVED: u8 = 2;

/// Shared lifecycle cell. Only moves forward.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        StateCell(AtomicU8::new(ACTIVE))
    }

    /// A cell for a subscription that was never registered.
    pub(crate) fn removed() -> Self {
        StateCell(AtomicU8::new(REMOVED))
    }

    pub(crate) fn get(&self) -> SubscriptionState {
        match self.0.load(Ordering::Acquire) {
            ACTIVE => SubscriptionState::Active,
            CANCELLING => SubscriptionState::Cancelling,
            _ => SubscriptionState::Removed,
        }
    }

    /// Active -> Cancelling. Returns false if cancel already happened.
    pub(crate) fn begin_cancel(&self) -> bool {
        self.0
            .compare_exchange(ACTIVE, CANCELLING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn mark_removed(&self) {
        self.0.store(REMOVED, Ordering::Release);
    }
}

/// Registry entry for one listener.
///
/// The registry (and any in-flight delivery) holds the sending half of the
/// listener's queue. Once the entry is removed and in-flight deliveries finish,
/// the sender is dropped and the handle's stream ends after draining.
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) sender: Sender<Arc<Record>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// Listener-facing side of a subscription.
///
/// Records arrive on a bounded FIFO queue. Dropping the handle cancels the
/// subscription.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    keys: Vec<InterestKey>,
    receiver: Receiver<Arc<Record>>,
    state: Arc<StateCell>,
    reaper: Sender<ReaperCommand>,
    registry: Arc<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        id: SubscriptionId,
        keys: Vec<InterestKey>,
        receiver: Receiver<Arc<Record>>,
        state: Arc<StateCell>,
        reaper: Sender<ReaperCommand>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            id,
            keys,
            receiver,
            state,
            reaper,
            registry,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Keys this subscription is registered under.
    pub fn keys(&self) -> &[InterestKey] {
        &self.keys
    }

    pub fn state(&self) -> SubscriptionState {
        self.state.get()
    }

    /// Number of records waiting in the queue.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Receive the next record (blocking).
    ///
    /// Fails once the subscription has been removed and the queue is drained.
    pub fn recv(&self) -> Result<Arc<Record>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a record (non-blocking).
    pub fn try_recv(&self) -> Result<Arc<Record>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Arc<Record>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Blocking iterator over the stream.
    pub fn iter(&self) -> crossbeam_channel::Iter<'_, Arc<Record>> {
        self.receiver.iter()
    }

    /// Signal cancellation without waiting for removal.
    ///
    /// Removal from the registry happens exactly once on the reaper worker.
    /// Already-queued records stay readable.
    pub fn cancel(&self) {
        if !self.state.begin_cancel() {
            return;
        }

        let command = ReaperCommand::Remove {
            id: self.id,
            keys: self.keys.clone(),
            state: Arc::clone(&self.state),
        };

        // The registry is closed before the reaper stops, so a command the
        // reaper will never see always finds it closed here.
        let sent = self.reaper.send(command).is_ok();
        if !sent || self.registry.is_closed() {
            tracing::debug!(subscription = %self.id, "cancel after shutdown");
            self.state.mark_removed();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("keys", &self.keys)
            .field("state", &self.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_types_is_wildcard() {
        let keys = interest_keys(Vec::<String>::new());
        assert_eq!(keys, vec![InterestKey::All]);
    }

    #[test]
    fn test_types_deduplicated_in_order() {
        let keys = interest_keys(["b", "a", "b"]);
        assert_eq!(
            keys,
            vec![InterestKey::Type("b".into()), InterestKey::Type("a".into())]
        );
    }

    #[test]
    fn test_state_cell_moves_forward_once() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), SubscriptionState::Active);

        assert!(cell.begin_cancel());
        assert!(!cell.begin_cancel());
        assert_eq!(cell.get(), SubscriptionState::Cancelling);

        cell.mark_removed();
        assert!(!cell.begin_cancel());
        assert_eq!(cell.get(), SubscriptionState::Removed);
    }

    #[test]
    fn test_subscription_ids_unique() {
        let a = SubscriptionId::new();
        let b = SubscriptionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_config_defaults() {
        let config = SubscriptionConfig::default();
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.capacity(), 1000);
        assert_eq!(config.send_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_zero_buffer_size_still_queues() {
        let config: SubscriptionConfig = serde_json::from_str(r#"{"buffer_size":0}"#).unwrap();
        assert_eq!(config.buffer_size, 0);
        assert_eq!(config.capacity(), 1);
    }
}
