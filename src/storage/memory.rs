//! In-memory event store.

use crate::error::{Result, StoreError};
use crate::types::{Record, SearchQuery, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::EventStore;

/// Event store backed by a map. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl EventStore for MemoryStore {
    fn create(&self, record: &Record) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(StoreError::RecordExists(record.id.clone()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Record> {
        if id.is_empty() {
            return Err(StoreError::InvalidId);
        }
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RecordNotFound(id.to_string()))
    }

    fn update(&self, record: &Record) -> Result<()> {
        if let Some(existing) = self.records.write().get_mut(&record.id) {
            *existing = record.clone();
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.records.write().remove(id);
        Ok(())
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<Record>> {
        let resolved = query.resolve(Timestamp::now());
        Ok(resolved.apply(self.records.read().values()))
    }
}
