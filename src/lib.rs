//! # Event Stream
//!
//! Ingestion of timestamped event records with durable lookup and live,
//! best-effort fan-out to subscribers.
//!
//! ## Core Concepts
//!
//! - **Records**: Immutable events routed by their `type`
//! - **Subscriptions**: Bounded per-listener queues registered by type or
//!   for everything
//! - **Broadcast**: At-most-once delivery with a bounded wait per listener
//! - **Stores**: Pluggable persistence behind the [`EventStore`] trait
//!
//! ## Example
//!
//! ```ignore
//! use event_stream::{EventService, Record, ServiceConfig};
//!
//! let service = EventService::new(ServiceConfig::default())?;
//!
//! // Listen for everything
//! let handle = service.subscribe(Vec::<String>::new());
//!
//! // Persist and broadcast a record
//! service.ingest(Record::new("1", "click", 1000))?;
//!
//! let record = handle.recv()?;
//! assert_eq!(record.id, "1");
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod service;
pub mod storage;
pub mod subscriptions;
pub mod types;
pub mod validate;

// Re-exports
pub use config::{ServiceConfig, StorageConfig};
pub use error::{EventError, EventResult, Result, StoreError};
pub use handler::Handler;
pub use service::EventService;
pub use storage::{EventStore, FileStore, FileStoreConfig, MemoryStore};
pub use subscriptions::{
    BroadcastStats, InterestKey, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager, SubscriptionRegistry, SubscriptionState,
};
pub use types::{Record, SearchQuery, Timestamp};
pub use validate::validate;
