//! Error types for event ingestion, persistence and streaming.

use thiserror::Error;

/// Errors raised by an [`EventStore`](crate::storage::EventStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record already exists: {0}")]
    RecordExists(String),

    #[error("Invalid event id")]
    InvalidId,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Errors surfaced to callers of the event service.
///
/// Broadcast delivery has no variant here: a record that cannot be queued for
/// a listener is dropped silently.
#[derive(Debug, Error)]
pub enum EventError {
    /// The record failed validation. Never retried.
    #[error("{0}")]
    InvalidInput(String),

    /// The persistence backend failed.
    #[error("upstream failure: {0}")]
    Upstream(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EventError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        EventError::InvalidInput(reason.into())
    }

    /// True for validation failures.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, EventError::InvalidInput(_))
    }

    /// True when the persistence backend reported the failure.
    pub fn is_upstream(&self) -> bool {
        matches!(self, EventError::Upstream(_))
    }
}

impl From<serde_json::Error> for EventError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            EventError::Io(e.into())
        } else {
            EventError::Serialization(e.to_string())
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type for service operations.
pub type EventResult<T> = std::result::Result<T, EventError>;
