//! Caller-supplied idempotency keys for mutating operations.
//!
//! A key moves through `in flight → completed(reference)`. Any second submission of
//! the same `(scope, depot, key)` is refused with `AlreadyProcessed`, naming the
//! document the first one produced. Keys never collide across depots, so a refusal
//! only ever names a document of the caller's own depot. A key whose attempt fails
//! is released so the client can retry it.

use std::collections::HashMap;

use parking_lot::Mutex;

use matflow_core::{DepotId, DomainError, DomainResult};

const MAX_KEY_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyState {
    InFlight,
    Completed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Slot {
    scope: &'static str,
    depot_id: DepotId,
    key: String,
}

#[derive(Debug, Default)]
pub struct IdempotencyStore {
    keys: Mutex<HashMap<Slot, KeyState>>,
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` within `scope` for work on `depot_id`.
    pub fn begin(&self, scope: &'static str, depot_id: DepotId, key: &str) -> DomainResult<IdempotencyTicket<'_>> {
        let key = key.trim();
        if key.is_empty() {
            return Err(DomainError::invalid_input("idempotency key cannot be empty"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(DomainError::invalid_input(format!(
                "idempotency key longer than {MAX_KEY_LEN} characters"
            )));
        }

        let slot = Slot {
            scope,
            depot_id,
            key: key.to_string(),
        };
        let mut keys = self.keys.lock();
        match keys.get(&slot) {
            Some(KeyState::Completed(reference)) => {
                return Err(DomainError::already_processed(format!(
                    "key '{key}' already produced {reference}"
                )));
            }
            Some(KeyState::InFlight) => {
                return Err(DomainError::already_processed(format!(
                    "key '{key}' is being processed"
                )));
            }
            None => {}
        }
        keys.insert(slot.clone(), KeyState::InFlight);

        Ok(IdempotencyTicket {
            store: self,
            slot,
            done: false,
        })
    }

    /// Reference recorded for a completed key.
    pub fn completed(&self, scope: &'static str, depot_id: DepotId, key: &str) -> Option<String> {
        let slot = Slot {
            scope,
            depot_id,
            key: key.trim().to_string(),
        };
        match self.keys.lock().get(&slot) {
            Some(KeyState::Completed(r)) => Some(r.clone()),
            _ => None,
        }
    }

    /// Claim `key`, run `f`, and record `reference(&result)` on success.
    pub fn run<T, E>(
        &self,
        scope: &'static str,
        depot_id: DepotId,
        key: &str,
        f: impl FnOnce() -> Result<T, E>,
        reference: impl FnOnce(&T) -> String,
    ) -> Result<T, E>
    where
        E: From<DomainError>,
    {
        let ticket = self.begin(scope, depot_id, key)?;
        let out = f()?;
        ticket.complete(reference(&out));
        Ok(out)
    }

    fn release(&self, slot: &Slot) {
        let mut keys = self.keys.lock();
        if keys.get(slot) == Some(&KeyState::InFlight) {
            keys.remove(slot);
        }
    }

    fn finish(&self, slot: Slot, reference: String) {
        self.keys.lock().insert(slot, KeyState::Completed(reference));
    }
}

/// Claim on an idempotency key. Dropping it without [`complete`](Self::complete)
/// releases the key.
#[derive(Debug)]
pub struct IdempotencyTicket<'a> {
    store: &'a IdempotencyStore,
    slot: Slot,
    done: bool,
}

impl IdempotencyTicket<'_> {
    pub fn key(&self) -> &str {
        &self.slot.key
    }

    pub fn complete(mut self, reference: impl Into<String>) {
        self.done = true;
        self.store.finish(self.slot.clone(), reference.into());
    }
}

impl Drop for IdempotencyTicket<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.store.release(&self.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depot() -> DepotId {
        DepotId::new()
    }

    #[test]
    fn completed_key_is_refused_with_its_reference() {
        let store = IdempotencyStore::new();
        let d = depot();
        store.begin("fulfill", d, "abc").unwrap().complete("BL-0001");

        let err = store.begin("fulfill", d, "abc").unwrap_err();
        match err {
            DomainError::AlreadyProcessed(msg) => assert!(msg.contains("BL-0001")),
            other => panic!("Expected AlreadyProcessed, got {other:?}"),
        }
        assert_eq!(store.completed("fulfill", d, "abc").as_deref(), Some("BL-0001"));
    }

    #[test]
    fn in_flight_key_is_refused() {
        let store = IdempotencyStore::new();
        let d = depot();
        let _ticket = store.begin("fulfill", d, "abc").unwrap();
        assert!(matches!(
            store.begin("fulfill", d, "abc"),
            Err(DomainError::AlreadyProcessed(_))
        ));
    }

    #[test]
    fn dropped_ticket_releases_the_key() {
        let store = IdempotencyStore::new();
        let d = depot();
        drop(store.begin("fulfill", d, "abc").unwrap());
        assert!(store.begin("fulfill", d, "abc").is_ok());
    }

    #[test]
    fn scopes_are_independent() {
        let store = IdempotencyStore::new();
        let d = depot();
        store.begin("stock.add", d, "k").unwrap().complete("m1");
        assert!(store.begin("stock.remove", d, "k").is_ok());
    }

    #[test]
    fn depots_never_share_a_key() {
        let store = IdempotencyStore::new();
        let (north, south) = (depot(), depot());
        store.begin("fulfill", north, "bl-1").unwrap().complete("BL-0007");

        let ticket = store.begin("fulfill", south, "bl-1").unwrap();
        assert_eq!(store.completed("fulfill", south, "bl-1"), None);
        ticket.complete("BL-0001");

        assert_eq!(store.completed("fulfill", north, "bl-1").as_deref(), Some("BL-0007"));
        match store.begin("fulfill", south, "bl-1") {
            Err(DomainError::AlreadyProcessed(msg)) => {
                assert!(msg.contains("BL-0001") && !msg.contains("BL-0007"), "{msg}");
            }
            other => panic!("Expected AlreadyProcessed, got {other:?}"),
        }
    }

    #[test]
    fn run_records_success_and_releases_failure() {
        let store = IdempotencyStore::new();
        let d = depot();

        let failed: Result<u32, DomainError> =
            store.run("s", d, "k", || Err(DomainError::invalid_input("nope")), |_| String::new());
        assert!(failed.is_err());

        let ok: Result<u32, DomainError> = store.run("s", d, "k", || Ok(7), |v| format!("v{v}"));
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(store.completed("s", d, "k").as_deref(), Some("v7"));
    }

    #[test]
    fn blank_keys_are_invalid_input() {
        let store = IdempotencyStore::new();
        assert!(matches!(store.begin("s", depot(), "  "), Err(DomainError::InvalidInput(_))));
    }
}
