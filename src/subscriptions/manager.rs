//! Subscription manager: subscribe/cancel lifecycle plus publishing.

use crate::error::EventResult;
use crate::types::Record;
use crate::validate::validate;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::broadcast::{BroadcastStats, Broadcaster};
use super::registry::SubscriptionRegistry;
use super::types::{
    interest_keys, InterestKey, StateCell, Subscription, SubscriptionConfig, SubscriptionHandle,
    SubscriptionId,
};

/// Work items for the reaper worker.
pub(crate) enum ReaperCommand {
    Remove {
        id: SubscriptionId,
        keys: Vec<InterestKey>,
        state: Arc<StateCell>,
    },
    Flush(Sender<()>),
    Shutdown,
}

/// Owns the registry and both workers.
///
/// Create one per process at service start and drop (or [`shutdown`]) it at
/// teardown; there is no global instance.
///
/// [`shutdown`]: SubscriptionManager::shutdown
pub struct SubscriptionManager {
    config: SubscriptionConfig,
    registry: Arc<SubscriptionRegistry>,
    broadcaster: Broadcaster,
    reaper: Sender<ReaperCommand>,
    reaper_worker: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionManager {
    /// Create a manager and start its dispatch and reaper workers.
    pub fn new(config: SubscriptionConfig) -> EventResult<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Broadcaster::start(config.send_timeout())?;

        let (reaper, commands) = unbounded();
        let reaper_registry = Arc::clone(&registry);
        let reaper_worker = thread::Builder::new()
            .name("event-reaper".into())
            .spawn(move || run_reaper(commands, reaper_registry))?;

        tracing::debug!(
            buffer_size = config.capacity(),
            send_timeout_ms = config.send_timeout_ms,
            "subscription manager started"
        );

        Ok(Self {
            config,
            registry,
            broadcaster,
            reaper,
            reaper_worker: Mutex::new(Some(reaper_worker)),
        })
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }

    /// Register a listener for `types`, or for every type if `types` is empty.
    ///
    /// The listener is registered before this returns, so anything published
    /// afterwards reaches it. After [`shutdown`] nothing is registered: the
    /// handle starts out `Removed` and its stream is already closed.
    ///
    /// [`shutdown`]: SubscriptionManager::shutdown
    pub fn subscribe<I, S>(&self, types: I) -> SubscriptionHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = SubscriptionId::new();
        let keys = interest_keys(types);
        let (sender, receiver) = bounded(self.config.capacity());

        let state = if self
            .registry
            .add(Arc::new(Subscription { id, sender }), &keys)
        {
            tracing::debug!(subscription = %id, keys = ?keys, "subscribed");
            StateCell::new()
        } else {
            tracing::debug!(subscription = %id, "subscribe after shutdown");
            StateCell::removed()
        };

        SubscriptionHandle::new(
            id,
            keys,
            receiver,
            Arc::new(state),
            self.reaper.clone(),
            Arc::clone(&self.registry),
        )
    }

    /// Validate `record` and broadcast it to matching listeners.
    ///
    /// Fails only on validation. Delivery happens later on the dispatch
    /// worker and its drops are never reported.
    pub fn publish(&self, record: Record) -> EventResult<()> {
        validate(Some(&record))?;
        self.broadcast(Arc::new(record));
        Ok(())
    }

    /// Broadcast a record that has already been validated.
    pub fn broadcast(&self, record: Arc<Record>) {
        self.broadcaster.broadcast(&self.registry, record);
    }

    /// Block until earlier cancellations are applied and earlier broadcasts
    /// have been attempted.
    pub fn flush(&self) {
        let (ack, done) = bounded(1);
        if self.reaper.send(ReaperCommand::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
        self.broadcaster.flush();
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &BroadcastStats {
        self.broadcaster.stats()
    }

    /// Stop both workers and discard all registrations. Idempotent.
    ///
    /// Pending broadcasts are attempted first. Handles outliving the manager
    /// see their stream end once drained, and later subscribes are refused.
    pub fn shutdown(&self) {
        // Closed before the reaper stops; see `SubscriptionHandle::cancel`.
        let discarded = self.registry.close();

        if let Some(worker) = self.reaper_worker.lock().take() {
            let _ = self.reaper.send(ReaperCommand::Shutdown);
            if worker.join().is_err() {
                tracing::warn!("reaper worker panicked");
            }
        }

        self.broadcaster.shutdown();

        tracing::debug!(discarded, "subscription manager stopped");
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_reaper(commands: Receiver<ReaperCommand>, registry: Arc<SubscriptionRegistry>) {
    for command in commands.iter() {
        match command {
            ReaperCommand::Remove { id, keys, state } => {
                let removed = registry.remove(id, &keys);
                state.mark_removed();
                tracing::debug!(subscription = %id, removed, "unsubscribed");
            }
            ReaperCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            ReaperCommand::Shutdown => break,
        }
    }
}
