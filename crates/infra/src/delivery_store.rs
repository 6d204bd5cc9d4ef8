//! Delivery note storage.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;

use matflow_core::{AggregateId, DepotId, DocumentKind, DomainError, DomainResult, Entity, UserId};
use matflow_delivery::{DeliveryNote, DeliveryNoteId, DeliveryNoteStatus, NewDeliveryNote};

use crate::sequence::SequenceGenerator;

/// List filter. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DeliveryNoteFilter {
    pub depot_id: Option<DepotId>,
    pub request_id: Option<AggregateId>,
    pub status: Option<DeliveryNoteStatus>,
}

impl DeliveryNoteFilter {
    pub fn matches(&self, note: &DeliveryNote) -> bool {
        self.depot_id.is_none_or(|d| note.belongs_to(d))
            && self.request_id.is_none_or(|r| note.request_id() == Some(r))
            && self.status.is_none_or(|s| note.status() == s)
    }
}

/// Write-once store of delivery notes. Only a note's status changes after issue.
#[derive(Debug)]
pub struct DeliveryNoteStore {
    notes: RwLock<HashMap<DeliveryNoteId, DeliveryNote>>,
    sequences: Arc<SequenceGenerator>,
}

impl DeliveryNoteStore {
    pub fn new(sequences: Arc<SequenceGenerator>) -> Self {
        Self {
            notes: RwLock::new(HashMap::new()),
            sequences,
        }
    }

    /// Number and store a new note. The `BL-` number is only consumed if the note
    /// is stored.
    pub fn issue(&self, new: NewDeliveryNote) -> DomainResult<DeliveryNote> {
        self.sequences
            .allocate(new.depot_id, DocumentKind::DeliveryNote, |numero| {
                let note = DeliveryNote::issue(new, numero)?;
                let mut notes = self.notes.write();
                if notes.contains_key(&note.id_typed()) {
                    return Err(DomainError::conflict(format!(
                        "delivery note {} already exists",
                        note.id_typed()
                    )));
                }
                notes.insert(note.id_typed(), note.clone());
                Ok(note)
            })
    }

    pub fn get(&self, id: DeliveryNoteId) -> DomainResult<DeliveryNote> {
        self.notes
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("delivery note {id}")))
    }

    /// Notes matching `filter`, ordered by depot then number.
    pub fn list(&self, filter: &DeliveryNoteFilter) -> Vec<DeliveryNote> {
        let mut out: Vec<_> = self
            .notes
            .read()
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();
        out.sort_by_key(|n| (n.depot_id(), n.numero()));
        out
    }

    pub fn cancel(&self, id: DeliveryNoteId, actor: UserId, at: DateTime<Utc>) -> DomainResult<DeliveryNote> {
        let mut notes = self.notes.write();
        let note = notes
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("delivery note {id}")))?;
        note.cancel(actor, at)?;
        Ok(note.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matflow_core::MaterielId;
    use matflow_delivery::DeliveryNoteLine;

    fn new_note(depot_id: DepotId, request_id: Option<AggregateId>, lines: usize) -> NewDeliveryNote {
        NewDeliveryNote {
            id: DeliveryNoteId::new(AggregateId::new()),
            depot_id,
            request_id,
            issuer: UserId::new(),
            recipient: UserId::new(),
            delivery_date: Utc::now().date_naive(),
            comment: None,
            lines: (1..=lines as u32)
                .map(|line_no| DeliveryNoteLine {
                    line_no,
                    materiel_id: MaterielId::new(),
                    designation: "Ciment CPJ45".into(),
                    unit: "sac".into(),
                    quantity: 2,
                    unit_price: 4_500,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    fn store() -> DeliveryNoteStore {
        DeliveryNoteStore::new(Arc::new(SequenceGenerator::new()))
    }

    #[test]
    fn issue_numbers_notes_per_depot() {
        let store = store();
        let depot = DepotId::new();

        let first = store.issue(new_note(depot, None, 1)).unwrap();
        let second = store.issue(new_note(depot, None, 2)).unwrap();
        let other = store.issue(new_note(DepotId::new(), None, 1)).unwrap();

        assert_eq!(first.numero().to_string(), "BL-0001");
        assert_eq!(second.numero().to_string(), "BL-0002");
        assert_eq!(other.numero().to_string(), "BL-0001");
        assert_eq!(first.status(), DeliveryNoteStatus::Delivered);
    }

    #[test]
    fn rejected_note_does_not_consume_a_number() {
        let store = store();
        let depot = DepotId::new();

        assert!(store.issue(new_note(depot, None, 0)).is_err());
        let note = store.issue(new_note(depot, None, 1)).unwrap();
        assert_eq!(note.numero().sequence(), 1);
    }

    #[test]
    fn list_filters_by_request_and_status() {
        let store = store();
        let depot = DepotId::new();
        let request = AggregateId::new();

        let linked = store.issue(new_note(depot, Some(request), 1)).unwrap();
        let direct = store.issue(new_note(depot, None, 1)).unwrap();
        store.cancel(direct.id_typed(), UserId::new(), Utc::now()).unwrap();

        let by_request = store.list(&DeliveryNoteFilter {
            request_id: Some(request),
            ..Default::default()
        });
        assert_eq!(by_request, vec![linked.clone()]);

        let cancelled = store.list(&DeliveryNoteFilter {
            depot_id: Some(depot),
            status: Some(DeliveryNoteStatus::Cancelled),
            ..Default::default()
        });
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id_typed(), direct.id_typed());
    }

    #[test]
    fn cancelling_twice_is_an_invalid_transition() {
        let store = store();
        let note = store.issue(new_note(DepotId::new(), None, 1)).unwrap();

        store.cancel(note.id_typed(), UserId::new(), Utc::now()).unwrap();
        assert!(matches!(
            store.cancel(note.id_typed(), UserId::new(), Utc::now()),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store.get(DeliveryNoteId::new(AggregateId::new())),
            Err(DomainError::NotFound(_))
        ));
    }
}
