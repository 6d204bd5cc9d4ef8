//! Per-depot document numbering.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use matflow_core::{DepotId, DocumentKind, DocumentNumber, DomainError};

/// Gap-free, per-(depot, kind) sequence generator.
///
/// Each counter has its own lock. [`SequenceGenerator::allocate`] holds it while the
/// caller stores the numbered document and only advances the counter when the
/// caller succeeds, so a failed insert never burns a number.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    counters: Mutex<HashMap<(DepotId, DocumentKind), Arc<Mutex<u64>>>>,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, depot_id: DepotId, kind: DocumentKind) -> Arc<Mutex<u64>> {
        self.counters
            .lock()
            .entry((depot_id, kind))
            .or_default()
            .clone()
    }

    /// Run `f` with the next number; commit the number only if `f` succeeds.
    pub fn allocate<T, E>(
        &self,
        depot_id: DepotId,
        kind: DocumentKind,
        f: impl FnOnce(DocumentNumber) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DomainError>,
    {
        let counter = self.counter(depot_id, kind);
        let mut last = counter.lock();
        let numero = DocumentNumber::new(kind, *last + 1)?;
        let out = f(numero)?;
        *last = numero.sequence();
        Ok(out)
    }

    /// Take the next number unconditionally.
    pub fn next(&self, depot_id: DepotId, kind: DocumentKind) -> Result<DocumentNumber, DomainError> {
        self.allocate(depot_id, kind, Ok::<_, DomainError>)
    }

    /// Last number handed out, if any.
    pub fn current(&self, depot_id: DepotId, kind: DocumentKind) -> Option<DocumentNumber> {
        let last = *self.counter(depot_id, kind).lock();
        DocumentNumber::new(kind, last).ok()
    }
}
