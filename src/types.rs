//! Core types for event records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since Unix epoch.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Timestamp(secs)
    }

    /// True for the unset value.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single event occurrence.
///
/// Records are plain values; once handed to the service they are shared as
/// `Arc<Record>` and never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Unique identifier.
    pub id: String,

    /// Event type, used as the fan-out routing key.
    #[serde(rename = "type")]
    pub record_type: String,

    /// Free-form producer tag.
    pub origin: String,

    /// When the event happened.
    pub timestamp: Timestamp,

    /// Correlation key grouping related events.
    pub root_id: String,

    /// Opaque key/value annotations.
    pub metadata: HashMap<String, String>,

    /// Opaque payload.
    pub data: Vec<u8>,
}

impl Record {
    /// Create a record with the three required fields set.
    pub fn new(id: impl Into<String>, record_type: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            timestamp: Timestamp(timestamp),
            ..Default::default()
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_root_id(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = root_id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }
}

/// Default search window when `from` is unset.
const DEFAULT_SEARCH_WINDOW_SECS: i64 = 60 * 60;

/// Default page size when `limit` is unset or negative.
const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Range query over stored records.
///
/// Zero/negative fields mean "use the default"; see [`SearchQuery::resolve`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    /// Only records with this root id (empty = any).
    pub root_id: String,
    /// Only records of this type (empty = any).
    #[serde(rename = "type")]
    pub record_type: String,
    /// Inclusive lower bound in seconds (0 = one hour ago).
    pub from: i64,
    /// Inclusive upper bound in seconds (0 = now).
    pub to: i64,
    pub limit: i64,
    pub offset: i64,
    /// Order by id descending instead of ascending.
    pub reverse: bool,
}

/// A [`SearchQuery`] with all defaults applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedQuery {
    pub root_id: Option<String>,
    pub record_type: Option<String>,
    pub from: Timestamp,
    pub to: Timestamp,
    pub limit: usize,
    pub offset: usize,
    pub reverse: bool,
}

impl SearchQuery {
    /// Apply defaults relative to `now`.
    ///
    /// - `limit <= 0` becomes 10
    /// - `offset < 0` becomes 0
    /// - `from == 0` becomes `now - 1h`
    /// - `to == 0` becomes `now`
    pub fn resolve(&self, now: Timestamp) -> ResolvedQuery {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

        ResolvedQuery {
            root_id: non_empty(&self.root_id),
            record_type: non_empty(&self.record_type),
            from: if self.from == 0 {
                Timestamp(now.0 - DEFAULT_SEARCH_WINDOW_SECS)
            } else {
                Timestamp(self.from)
            },
            to: if self.to == 0 { now } else { Timestamp(self.to) },
            limit: if self.limit <= 0 {
                DEFAULT_SEARCH_LIMIT as usize
            } else {
                self.limit as usize
            },
            offset: self.offset.max(0) as usize,
            reverse: self.reverse,
        }
    }
}

impl ResolvedQuery {
    /// Check whether a record falls inside this query's filters.
    pub fn matches(&self, record: &Record) -> bool {
        if record.timestamp < self.from || record.timestamp > self.to {
            return false;
        }
        if let Some(ref root_id) = self.root_id {
            if &record.root_id != root_id {
                return false;
            }
        }
        if let Some(ref record_type) = self.record_type {
            if &record.record_type != record_type {
                return false;
            }
        }
        true
    }

    /// Filter, order by id, and page a set of candidate records.
    pub fn apply<'a, I>(&self, records: I) -> Vec<Record>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut hits: Vec<&Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        if self.reverse {
            hits.reverse();
        }

        hits.into_iter()
            .skip(self.offset)
            .take(self.limit)
            .cloned()
            .collect()
    }
}
