//! Event-sourced decision model used by the request workflow.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{DomainError, DomainResult};

/// Identity and stream revision of an event-sourced record.
pub trait AggregateRoot {
    type Id: Clone + Eq + Hash + Debug;

    fn id(&self) -> &Self::Id;

    /// Events applied so far; 0 for a stream that does not exist yet.
    fn version(&self) -> u64;
}

/// What a writer believes the stream revision to be when it appends.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    Any,
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        !matches!(self, ExpectedVersion::Exact(v) if v != actual)
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if !self.matches(actual) {
            return Err(DomainError::conflict(format!(
                "stream moved on: expected {self:?}, now at {actual}"
            )));
        }
        Ok(())
    }
}

/// Pure decide/evolve pair.
///
/// `handle` reads state and returns the events a command produces, or the
/// business error refusing it. `apply` folds one event into state and bumps the
/// version. Neither touches storage, clocks or locks.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + Debug;
    type Event: Clone + Debug;
    type Error: Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
