use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use matflow_core::{AggregateId, DepotId, ExpectedVersion};
use matflow_events::{Event, EventEnvelope};

/// One aggregate stream. Two depots never share a stream even for equal ids.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub depot_id: DepotId,
    pub aggregate_id: AggregateId,
}

impl StreamId {
    pub fn new(depot_id: DepotId, aggregate_id: AggregateId) -> Self {
        Self { depot_id, aggregate_id }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.depot_id, self.aggregate_id)
    }
}

/// A decided event waiting for its position in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub stream: StreamId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialise a typed aggregate event for `stream`.
    pub fn encode<E>(stream: StreamId, aggregate_type: &str, event: &E) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::InvalidBatch(format!("{}: {e}", event.event_type())))?;
        Ok(Self {
            event_id: Uuid::now_v7(),
            stream,
            aggregate_type: aggregate_type.to_owned(),
            event_type: event.event_type().to_owned(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }

    /// Fix the event at `sequence_number`.
    pub fn seal(self, sequence_number: u64) -> StoredEvent {
        StoredEvent {
            sequence_number,
            event: self,
        }
    }
}

/// A committed event. Its sequence number never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub sequence_number: u64,
    #[serde(flatten)]
    pub event: UncommittedEvent,
}

impl StoredEvent {
    pub fn stream(&self) -> StreamId {
        self.event.stream
    }

    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    pub fn payload(&self) -> &JsonValue {
        &self.event.payload
    }

    /// What subscribers and projections receive.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event.event_id,
            self.event.stream.depot_id,
            self.event.stream.aggregate_id,
            self.event.aggregate_type.clone(),
            self.sequence_number,
            self.event.payload.clone(),
        )
    }
}

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("stream {stream} is at version {actual}, writer expected {expected:?}")]
    Concurrency {
        stream: StreamId,
        expected: ExpectedVersion,
        actual: u64,
    },

    #[error("depot isolation violation: {0}")]
    DepotIsolation(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Append-only store of aggregate streams.
///
/// `append` takes a batch for exactly one stream, checks `expected` against the
/// stream's current version, and numbers the batch from `current + 1`. A batch
/// is written entirely or not at all.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        batch: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Ordered by sequence number; an unknown stream is empty.
    fn load_stream(&self, stream: StreamId) -> Result<Vec<StoredEvent>, EventStoreError>;
}

impl<S: EventStore + ?Sized> EventStore for Arc<S> {
    fn append(
        &self,
        batch: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        S::append(self, batch, expected)
    }

    fn load_stream(&self, stream: StreamId) -> Result<Vec<StoredEvent>, EventStoreError> {
        S::load_stream(self, stream)
    }
}
