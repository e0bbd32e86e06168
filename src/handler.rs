//! Request handlers for the transport layer.
//!
//! Each handler takes a decoded request, applies the request-level defaults
//! and checks, and calls into [`EventService`]. `stream` writes one JSON
//! object per line for every delivered record until the writer fails.

use crate::error::{EventError, EventResult};
use crate::service::EventService;
use crate::types::{Record, SearchQuery, Timestamp};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    pub record: Option<Record>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateResponse {
    /// Id of the stored record (generated when the request left it empty).
    pub id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReadRequest {
    pub id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReadResponse {
    pub record: Record,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub record: Option<Record>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub records: Vec<Record>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamRequest {
    /// Types to receive; empty for all.
    pub types: Vec<String>,
}

/// One line of a record stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamResponse {
    pub record: Record,
}

#[derive(Serialize)]
struct StreamFrame<'a> {
    record: &'a Record,
}

/// Transport-facing request handler.
#[derive(Clone)]
pub struct Handler {
    service: Arc<EventService>,
}

impl Handler {
    pub fn new(service: Arc<EventService>) -> Self {
        Self { service }
    }

    /// Store a record, filling in a fresh id and the current time if unset.
    pub fn create(&self, req: CreateRequest) -> EventResult<CreateResponse> {
        let mut record = req
            .record
            .ok_or_else(|| EventError::invalid("invalid record"))?;

        if record.timestamp.is_zero() {
            record.timestamp = Timestamp::now();
        }
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        self.service.create(&record)?;
        Ok(CreateResponse { id: record.id })
    }

    pub fn read(&self, req: ReadRequest) -> EventResult<ReadResponse> {
        let record = self.service.read(&req.id)?;
        Ok(ReadResponse { record })
    }

    /// Replace a stored record. The id is required; the time defaults to now.
    pub fn update(&self, req: UpdateRequest) -> EventResult<()> {
        let mut record = req
            .record
            .ok_or_else(|| EventError::invalid("invalid record"))?;

        if record.id.is_empty() {
            return Err(EventError::invalid("invalid id"));
        }
        if record.timestamp.is_zero() {
            record.timestamp = Timestamp::now();
        }

        self.service.update(&record)
    }

    pub fn delete(&self, req: DeleteRequest) -> EventResult<()> {
        self.service.delete(&req.id)
    }

    pub fn search(&self, req: SearchQuery) -> EventResult<SearchResponse> {
        let records = self.service.search(&req)?;
        Ok(SearchResponse { records })
    }

    /// Stream matching records to `writer` as JSON lines.
    ///
    /// Blocks until the writer fails or the service shuts down. The
    /// subscription is cancelled on return either way.
    pub fn stream<W: Write>(&self, req: StreamRequest, mut writer: W) -> EventResult<()> {
        let handle = self.service.subscribe(req.types);
        tracing::debug!(subscription = %handle.id(), "stream opened");

        for record in handle.iter() {
            let sent = serde_json::to_writer(&mut writer, &StreamFrame { record: &record })
                .map_err(EventError::from)
                .and_then(|()| {
                    writer.write_all(b"\n")?;
                    writer.flush()?;
                    Ok(())
                });

            if let Err(e) = sent {
                tracing::debug!(subscription = %handle.id(), error = %e, "stream closed");
                return Err(e);
            }
        }

        Ok(())
    }
}
