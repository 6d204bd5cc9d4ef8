use std::collections::HashMap;

use parking_lot::RwLock;

use matflow_core::ExpectedVersion;

use super::store::{EventStore, EventStoreError, StoredEvent, StreamId, UncommittedEvent};

/// Streams kept in a process-local map. Used by the API process and the tests.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }
}

/// The one stream and aggregate type a batch writes to.
fn batch_target(batch: &[UncommittedEvent]) -> Result<Option<(StreamId, &str)>, EventStoreError> {
    let Some(head) = batch.first() else {
        return Ok(None);
    };
    for (idx, ev) in batch.iter().enumerate().skip(1) {
        if ev.stream.depot_id != head.stream.depot_id {
            return Err(EventStoreError::DepotIsolation(format!(
                "event {idx} targets depot {}, batch started in {}",
                ev.stream.depot_id, head.stream.depot_id
            )));
        }
        if ev.stream != head.stream || ev.aggregate_type != head.aggregate_type {
            return Err(EventStoreError::InvalidBatch(format!(
                "event {idx} targets {} ({}), batch started on {} ({})",
                ev.stream, ev.aggregate_type, head.stream, head.aggregate_type
            )));
        }
    }
    Ok(Some((head.stream, head.aggregate_type.as_str())))
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        batch: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let Some((stream_id, aggregate_type)) = batch_target(&batch)? else {
            return Ok(Vec::new());
        };

        let mut streams = self.streams.write();
        let stream = streams.entry(stream_id).or_default();

        if let Some(existing) = stream.first().map(|e| e.event.aggregate_type.as_str()) {
            if existing != aggregate_type {
                return Err(EventStoreError::InvalidBatch(format!(
                    "stream {stream_id} holds {existing} events, not {aggregate_type}"
                )));
            }
        }

        let actual = stream.last().map_or(0, |e| e.sequence_number);
        if !expected.matches(actual) {
            return Err(EventStoreError::Concurrency {
                stream: stream_id,
                expected,
                actual,
            });
        }

        let committed: Vec<StoredEvent> = batch
            .into_iter()
            .zip(actual + 1..)
            .map(|(ev, seq)| ev.seal(seq))
            .collect();
        stream.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(&self, stream: StreamId) -> Result<Vec<StoredEvent>, EventStoreError> {
        Ok(self.streams.read().get(&stream).cloned().unwrap_or_default())
    }
}
