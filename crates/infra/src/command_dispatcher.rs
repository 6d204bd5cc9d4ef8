//! Runs commands against event-sourced aggregates.
//!
//! Each dispatch loads the stream, replays it into a fresh aggregate, lets the
//! aggregate decide, appends what it decided at the version it saw, and only
//! then publishes the committed envelopes. Publication failures are logged; the
//! append stands and bus consumers catch up from the store.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use matflow_core::{Aggregate, DomainError, ExpectedVersion};
use matflow_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamId, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Someone appended to the stream between our load and our append.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("depot isolation violation: {0}")]
    DepotIsolation(String),

    /// A stored payload no longer matches the aggregate's event type.
    #[error("unreadable stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            err @ EventStoreError::Concurrency { .. } => DispatchError::Concurrency(err.to_string()),
            EventStoreError::DepotIsolation(msg) => DispatchError::DepotIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Execute `command` on `stream` and return what was committed.
    ///
    /// A command that decides nothing commits nothing.
    pub fn dispatch<A>(
        &self,
        stream: StreamId,
        aggregate_type: &str,
        command: A::Command,
        fresh: impl FnOnce(StreamId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: matflow_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.history(stream)?;
        let seen = history.last().map_or(0, |e| e.sequence_number);
        let aggregate: A = replay(fresh(stream), &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(Vec::new());
        }

        let batch = decided
            .iter()
            .map(|ev| UncommittedEvent::encode(stream, aggregate_type, ev))
            .collect::<Result<Vec<_>, _>>()?;
        let committed = self.store.append(batch, ExpectedVersion::Exact(seen))?;

        for stored in &committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    %stream,
                    event_type = stored.event_type(),
                    sequence = stored.sequence_number,
                    error = ?err,
                    "committed event not published"
                );
            }
        }
        Ok(committed)
    }

    /// Current state of `stream` without running anything.
    pub fn load<A>(&self, stream: StreamId, fresh: impl FnOnce(StreamId) -> A) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.history(stream)?;
        replay(fresh(stream), &history)
    }

    /// Load `stream`, refusing anything a misbehaving backend might hand back
    /// from another stream or out of order.
    fn history(&self, stream: StreamId) -> Result<Vec<StoredEvent>, DispatchError> {
        let history = self.store.load_stream(stream)?;
        let mut previous = 0u64;
        for stored in &history {
            if stored.stream() != stream {
                return Err(DispatchError::DepotIsolation(format!(
                    "loading {stream} returned an event of {}",
                    stored.stream()
                )));
            }
            if stored.sequence_number <= previous {
                return Err(DispatchError::Store(EventStoreError::InvalidBatch(format!(
                    "{stream}: sequence {} follows {previous}",
                    stored.sequence_number
                ))));
            }
            previous = stored.sequence_number;
        }
        Ok(history)
    }
}

fn replay<A>(mut aggregate: A, history: &[StoredEvent]) -> Result<A, DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let event = <A::Event as Deserialize>::deserialize(stored.payload()).map_err(|e| {
            DispatchError::Deserialize(format!("{} #{}: {e}", stored.event_type(), stored.sequence_number))
        })?;
        aggregate.apply(&event);
    }
    Ok(aggregate)
}
