//! Domain events, envelopes and the pub/sub plumbing that carries them.
//!
//! The core never waits on event delivery: it hands events to an [`EventSink`]
//! after its own state change has committed.

pub mod bus;
pub mod domain;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use domain::{BusEventSink, DomainEvent, EventSink};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::InMemoryEventBus;
