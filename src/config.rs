//! Service configuration.

use crate::error::{EventResult, Result};
use crate::storage::{EventStore, FileStore, FileStoreConfig, MemoryStore};
use crate::subscriptions::SubscriptionConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which persistence backend to use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Memory,
    File(FileStoreConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

impl StorageConfig {
    /// Open the configured backend.
    pub fn open(&self) -> Result<Arc<dyn EventStore>> {
        match self {
            StorageConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            StorageConfig::File(config) => Ok(Arc::new(FileStore::open_or_create(config.clone())?)),
        }
    }
}

/// Top-level configuration for [`EventService`](crate::EventService).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub subscriptions: SubscriptionConfig,
    pub storage: StorageConfig,
}

impl ServiceConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> EventResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_empty_json_is_default() {
        let config = ServiceConfig::from_json("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.subscriptions.buffer_size, 1000);
        assert_eq!(config.storage, StorageConfig::Memory);
    }

    #[test]
    fn test_file_backend_json() {
        let config = ServiceConfig::from_json(
            r#"{
                "subscriptions": { "send_timeout_ms": 250 },
                "storage": { "backend": "file", "path": "/var/lib/events", "sync_interval": 10 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.subscriptions.send_timeout_ms, 250);
        assert_eq!(config.subscriptions.buffer_size, 1000);
        match config.storage {
            StorageConfig::File(file) => {
                assert_eq!(file.path, PathBuf::from("/var/lib/events"));
                assert_eq!(file.sync_interval, 10);
                assert!(file.create_if_missing);
            }
            other => panic!("expected file backend, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = ServiceConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, crate::EventError::Serialization(_)));
    }
}
