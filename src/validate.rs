//! Precondition checks shared by the persistence and broadcast paths.

use crate::error::{EventError, EventResult};
use crate::types::Record;

/// Reject malformed records.
///
/// Checks run in order and stop at the first failure: the record must be
/// present, then have a non-empty id, a non-empty type, and a non-zero
/// timestamp.
pub fn validate(record: Option<&Record>) -> EventResult<&Record> {
    let record = record.ok_or_else(|| EventError::invalid("invalid record"))?;

    if record.id.is_empty() {
        return Err(EventError::invalid("invalid id"));
    }

    if record.record_type.is_empty() {
        return Err(EventError::invalid("invalid type"));
    }

    if record.timestamp.is_zero() {
        return Err(EventError::invalid("invalid timestamp"));
    }

    Ok(record)
}

/// Owned variant of [`validate`] for callers that take the record by value.
pub fn validated(record: Option<Record>) -> EventResult<Record> {
    validate(record.as_ref())?;
    record.ok_or_else(|| EventError::invalid("invalid record"))
}
