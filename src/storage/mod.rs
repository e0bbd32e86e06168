//! Durable lookup of event records.
//!
//! The service only needs the narrow [`EventStore`] contract. Two backends
//! ship with the crate:
//! - [`MemoryStore`]: a process-local map, for tests and ephemeral use
//! - [`FileStore`]: an append-only log in a locked directory, replayed into
//!   an in-memory index on open

mod file;
mod memory;

pub use file::{FileStore, FileStoreConfig};
pub use memory::MemoryStore;

use crate::error::Result;
use crate::types::{Record, SearchQuery};

/// Persistence contract used by the service.
///
/// `update` and `delete` of an unknown id succeed without effect; `create`
/// of an existing id fails with [`StoreError::RecordExists`].
///
/// [`StoreError::RecordExists`]: crate::StoreError::RecordExists
pub trait EventStore: Send + Sync {
    fn create(&self, record: &Record) -> Result<()>;

    fn read(&self, id: &str) -> Result<Record>;

    /// Replace every field of the stored record with the same id.
    fn update(&self, record: &Record) -> Result<()>;

    fn delete(&self, id: &str) -> Result<()>;

    /// Records matching the query's filters, ordered by id and paged.
    fn search(&self, query: &SearchQuery) -> Result<Vec<Record>>;
}
