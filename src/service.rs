//! Event service: ties validation, persistence and live broadcast together.

use crate::config::ServiceConfig;
use crate::error::{EventError, EventResult};
use crate::storage::EventStore;
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle, SubscriptionManager};
use crate::types::{Record, SearchQuery};
use crate::validate::{validate, validated};
use std::sync::Arc;

/// The composition root.
///
/// Owns exactly one [`SubscriptionManager`] and one [`EventStore`]. Build it
/// once at startup; dropping it (or calling [`shutdown`]) stops the workers and
/// discards all live subscriptions.
///
/// Ingestion has two independent paths. [`process`] persists, [`publish`]
/// broadcasts, and [`ingest`] does both without letting one path's failure
/// affect the other.
///
/// [`shutdown`]: EventService::shutdown
/// [`process`]: EventService::process
/// [`publish`]: EventService::publish
/// [`ingest`]: EventService::ingest
pub struct EventService {
    subscriptions: SubscriptionManager,
    store: Arc<dyn EventStore>,
}

impl EventService {
    /// Open the configured store and start the subscription workers.
    pub fn new(config: ServiceConfig) -> EventResult<Self> {
        let store = config.storage.open()?;
        Self::with_store(config.subscriptions, store)
    }

    /// Use an already-open store.
    pub fn with_store(
        config: SubscriptionConfig,
        store: Arc<dyn EventStore>,
    ) -> EventResult<Self> {
        Ok(Self {
            subscriptions: SubscriptionManager::new(config)?,
            store,
        })
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    // --- Ingestion ---

    /// Validate and persist.
    pub fn process(&self, record: impl Into<Option<Record>>) -> EventResult<()> {
        let record = record.into();
        let record = validate(record.as_ref())?;
        self.store.create(record)?;
        Ok(())
    }

    /// Validate and broadcast to live subscribers.
    pub fn publish(&self, record: impl Into<Option<Record>>) -> EventResult<()> {
        let record = validated(record.into())?;
        self.subscriptions.broadcast(Arc::new(record));
        Ok(())
    }

    /// Validate once, then broadcast and persist.
    ///
    /// The broadcast happens regardless of the persistence outcome; only the
    /// persistence error is returned.
    pub fn ingest(&self, record: impl Into<Option<Record>>) -> EventResult<()> {
        let record = Arc::new(validated(record.into())?);
        self.subscriptions.broadcast(Arc::clone(&record));

        if let Err(e) = self.store.create(&record) {
            tracing::warn!(id = %record.id, error = %e, "failed to persist record");
            return Err(e.into());
        }
        Ok(())
    }

    // --- Subscriptions ---

    /// Subscribe to `types`, or to everything when `types` is empty.
    pub fn subscribe<I, S>(&self, types: I) -> SubscriptionHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions.subscribe(types)
    }

    // --- Stored records ---

    pub fn create(&self, record: &Record) -> EventResult<()> {
        Ok(self.store.create(record)?)
    }

    pub fn read(&self, id: &str) -> EventResult<Record> {
        if id.is_empty() {
            return Err(EventError::invalid("invalid id"));
        }
        Ok(self.store.read(id)?)
    }

    pub fn update(&self, record: &Record) -> EventResult<()> {
        Ok(self.store.update(record)?)
    }

    pub fn delete(&self, id: &str) -> EventResult<()> {
        if id.is_empty() {
            return Err(EventError::invalid("invalid id"));
        }
        Ok(self.store.delete(id)?)
    }

    pub fn search(&self, query: &SearchQuery) -> EventResult<Vec<Record>> {
        Ok(self.store.search(query)?)
    }

    // --- Lifecycle ---

    /// Wait for pending cancellations and broadcasts.
    pub fn flush(&self) {
        self.subscriptions.flush();
    }

    pub fn shutdown(&self) {
        self.subscriptions.shutdown();
    }
}
