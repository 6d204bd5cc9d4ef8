//! Append-only persistence for aggregate streams.
//!
//! Only the request workflow is event-sourced; stock and delivery notes keep
//! their own stores.

pub mod in_memory;
pub mod store;

pub use in_memory::InMemoryEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, StreamId, UncommittedEvent};
