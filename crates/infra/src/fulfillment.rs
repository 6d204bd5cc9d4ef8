//! Fulfilment: turn approved requests (or direct distributions) into delivery notes
//! and outgoing stock movements, all or nothing.
//!
//! ```text
//! idempotency key ─▶ request lock ─▶ material locks (ascending id)
//!                                      │ check every line
//!                                      │ request → delivered, note issued (BL-xxxx)
//!                                      ▼ apply deltas, append movements in line order
//! ```
//!
//! Nothing is written unless every step succeeds. Events are emitted after the
//! locks are released.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use matflow_core::{AggregateId, DepotId, DomainError, MaterielId, UserId};
use matflow_delivery::{DeliveryNote, DeliveryNoteId, DeliveryNoteLine, DeliveryNoteStatus, NewDeliveryNote};
use matflow_events::{DomainEvent, EventBus, EventEnvelope, EventSink};
use matflow_requests::{NewLine, RequestId, RequestStatus, validate_new_lines};
use matflow_stock::{MovementReason, MovementRef, StockAdjustment};

use crate::catalog::CatalogLookup;
use crate::delivery_store::DeliveryNoteStore;
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::EventStore;
use crate::idempotency::IdempotencyStore;
use crate::ledger::{MovementEntry, StockLedger};
use crate::locks::KeyedLocks;
use crate::request_store::{RequestStore, RequestTransition};

const FULFIL_REQUEST_SCOPE: &str = "fulfillment.request";
const FULFIL_DIRECT_SCOPE: &str = "fulfillment.direct";

/// Materials handed over without a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectDistribution {
    pub depot_id: DepotId,
    pub issuer: UserId,
    pub recipient: UserId,
    pub lines: Vec<NewLine>,
    pub comment: Option<String>,
}

pub struct FulfillmentProcessor<S, B> {
    requests: Arc<RequestStore<S, B>>,
    deliveries: Arc<DeliveryNoteStore>,
    ledger: Arc<StockLedger>,
    catalog: Arc<dyn CatalogLookup>,
    idempotency: Arc<IdempotencyStore>,
    sink: Arc<dyn EventSink>,
    note_locks: KeyedLocks<DeliveryNoteId>,
}

impl<S, B> FulfillmentProcessor<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        requests: Arc<RequestStore<S, B>>,
        deliveries: Arc<DeliveryNoteStore>,
        ledger: Arc<StockLedger>,
        catalog: Arc<dyn CatalogLookup>,
        idempotency: Arc<IdempotencyStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            requests,
            deliveries,
            ledger,
            catalog,
            idempotency,
            sink,
            note_locks: KeyedLocks::new(),
        }
    }

    /// Deliver every positively granted line of an approved request.
    pub fn fulfill_from_request(
        &self,
        request_id: RequestId,
        issuer: UserId,
        idempotency_key: &str,
    ) -> ServiceResult<DeliveryNote> {
        let depot_id = self.requests.get(request_id)?.depot_id;
        let ticket = self.idempotency.begin(FULFIL_REQUEST_SCOPE, depot_id, idempotency_key)?;

        let lock = self.requests.lock(request_id);
        let _guard = lock.lock();

        let request = self.requests.get(request_id)?;
        if request.status != RequestStatus::Approved {
            tracing::warn!(%request_id, status = %request.status, "fulfilment of a non-approved request");
            return Err(DomainError::invalid_state(format!(
                "request {} is {}, expected approved",
                request.numero, request.status
            ))
            .into());
        }

        // Zero grants produce neither a note line nor a movement.
        let to_deliver: Vec<(MaterielId, i64)> = request
            .lines
            .iter()
            .filter_map(|l| {
                l.quantity_granted
                    .filter(|granted| *granted > 0)
                    .map(|granted| (l.materiel_id, granted))
            })
            .collect();

        let note_id = DeliveryNoteId::new(AggregateId::new());
        let new_note = self.prepare_note(
            note_id,
            request.depot_id,
            Some(request.id.0),
            issuer,
            request.requester,
            None,
            &to_deliver,
        )?;

        let adjustments: Vec<_> = to_deliver
            .iter()
            .map(|(materiel_id, qty)| StockAdjustment::outgoing(*materiel_id, *qty))
            .collect();
        let entry = MovementEntry::new(MovementReason::FulfillmentOut, issuer)
            .related(MovementRef::DeliveryNote(note_id.0));

        let (note, movements) = self.ledger.transact(&adjustments, entry, || {
            self.requests.transition(
                request_id,
                RequestTransition::Deliver {
                    delivery_note_id: note_id.0,
                },
            )?;
            Ok::<_, ServiceError>(self.deliveries.issue(new_note)?)
        })?;

        tracing::info!(
            %request_id,
            request_numero = %request.numero,
            note_numero = %note.numero(),
            lines = movements.len(),
            "request fulfilled"
        );
        ticket.complete(note.numero().to_string());
        self.emit_issued(&note);
        Ok(note)
    }

    /// Hand materials over without a request. Lines are validated like request lines.
    pub fn fulfill_direct(&self, order: DirectDistribution, idempotency_key: &str) -> ServiceResult<DeliveryNote> {
        let ticket = self
            .idempotency
            .begin(FULFIL_DIRECT_SCOPE, order.depot_id, idempotency_key)?;

        validate_new_lines(&order.lines)?;
        let to_deliver: Vec<(MaterielId, i64)> =
            order.lines.iter().map(|l| (l.materiel_id, l.quantity)).collect();

        let note_id = DeliveryNoteId::new(AggregateId::new());
        let new_note = self.prepare_note(
            note_id,
            order.depot_id,
            None,
            order.issuer,
            order.recipient,
            order.comment,
            &to_deliver,
        )?;

        let adjustments: Vec<_> = to_deliver
            .iter()
            .map(|(materiel_id, qty)| StockAdjustment::outgoing(*materiel_id, *qty))
            .collect();
        let entry = MovementEntry::new(MovementReason::FulfillmentOut, order.issuer)
            .related(MovementRef::DeliveryNote(note_id.0));

        let (note, movements) = self
            .ledger
            .transact(&adjustments, entry, || self.deliveries.issue(new_note))?;

        tracing::info!(
            depot_id = %order.depot_id,
            note_numero = %note.numero(),
            lines = movements.len(),
            "direct distribution issued"
        );
        ticket.complete(note.numero().to_string());
        self.emit_issued(&note);
        Ok(note)
    }

    /// Cancel a delivered note and return its quantities to stock with one
    /// `correction` movement per line. The originating request stays delivered.
    pub fn cancel_delivery_note(
        &self,
        note_id: DeliveryNoteId,
        actor: UserId,
        comment: Option<String>,
    ) -> ServiceResult<DeliveryNote> {
        let lock = self.note_locks.get(note_id);
        let _guard = lock.lock();

        let note = self.deliveries.get(note_id)?;
        if note.status() != DeliveryNoteStatus::Delivered {
            return Err(DomainError::invalid_transition(note.status(), DeliveryNoteStatus::Cancelled).into());
        }

        let adjustments: Vec<_> = note
            .lines()
            .iter()
            .map(|l| StockAdjustment::new(l.materiel_id, l.quantity))
            .collect();
        let entry = MovementEntry::new(MovementReason::Correction, actor)
            .related(MovementRef::DeliveryNote(note_id.0))
            .comment(comment.or_else(|| Some(format!("cancellation of {}", note.numero()))));

        let (cancelled, movements) = self.ledger.transact(&adjustments, entry, || {
            self.deliveries.cancel(note_id, actor, Utc::now())
        })?;

        tracing::info!(
            note_numero = %cancelled.numero(),
            %actor,
            lines = movements.len(),
            "delivery note cancelled"
        );
        self.sink.emit(DomainEvent::DeliveryNoteCancelled {
            depot_id: cancelled.depot_id(),
            delivery_note_id: note_id.0,
            numero: cancelled.numero(),
            cancelled_by: actor,
            occurred_at: cancelled.cancelled_at().unwrap_or_else(Utc::now),
        });
        Ok(cancelled)
    }

    /// Snapshot catalog attributes into note lines, numbered from 1.
    #[allow(clippy::too_many_arguments)]
    fn prepare_note(
        &self,
        id: DeliveryNoteId,
        depot_id: DepotId,
        request_id: Option<AggregateId>,
        issuer: UserId,
        recipient: UserId,
        comment: Option<String>,
        to_deliver: &[(MaterielId, i64)],
    ) -> ServiceResult<NewDeliveryNote> {
        let materiels: Vec<_> = to_deliver.iter().map(|(m, _)| *m).collect();
        let infos = self.catalog.resolve_lines(depot_id, &materiels)?;

        let lines = to_deliver
            .iter()
            .zip(infos)
            .enumerate()
            .map(|(idx, ((materiel_id, quantity), info))| DeliveryNoteLine {
                line_no: idx as u32 + 1,
                materiel_id: *materiel_id,
                designation: info.name,
                unit: info.unit,
                quantity: *quantity,
                unit_price: info.unit_price,
            })
            .collect();

        let now = Utc::now();
        Ok(NewDeliveryNote {
            id,
            depot_id,
            request_id,
            issuer,
            recipient,
            delivery_date: now.date_naive(),
            comment: comment.filter(|c| !c.trim().is_empty()),
            lines,
            created_at: now,
        })
    }

    fn emit_issued(&self, note: &DeliveryNote) {
        self.sink.emit(DomainEvent::DeliveryNoteIssued {
            depot_id: note.depot_id(),
            delivery_note_id: note.id_typed().0,
            numero: note.numero(),
            request_id: note.request_id(),
            recipient: note.recipient(),
            occurred_at: note.created_at(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, MaterialInfo};
    use crate::event_store::InMemoryEventStore;
    use crate::ledger::ManualOp;
    use crate::request_store::{InMemoryRequestStore, NewRequest};
    use crate::sequence::SequenceGenerator;
    use crate::validation::{Decision, ValidationEngine};
    use matflow_core::ErrorKind;
    use matflow_events::{BusEventSink, InMemoryEventBus, Subscription};
    use matflow_requests::{LineGrant, Priority};
    use matflow_stock::DateRange;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct Fixture {
        processor: FulfillmentProcessor<Arc<InMemoryEventStore>, Bus>,
        validation: ValidationEngine<Arc<InMemoryEventStore>, Bus>,
        requests: Arc<InMemoryRequestStore>,
        ledger: Arc<StockLedger>,
        depot: DepotId,
        cement: MaterielId,
        sand: MaterielId,
        events: Subscription<DomainEvent>,
    }

    fn fixture() -> Fixture {
        let bus = InMemoryEventBus::<DomainEvent>::new();
        let events = bus.subscribe();
        let sink: Arc<dyn EventSink> = Arc::new(BusEventSink::new(bus));

        let depot = DepotId::new();
        let catalog = Arc::new(InMemoryCatalog::new());
        let ledger = Arc::new(StockLedger::new(sink.clone()));
        let mut ids = Vec::new();
        for (name, price) in [("Ciment CPJ45", 4_500), ("Sable 0/4", 1_200)] {
            let id = MaterielId::new();
            catalog
                .register_material(MaterialInfo {
                    id,
                    depot_id: depot,
                    name: name.into(),
                    unit: "sac".into(),
                    unit_price: price,
                    category_id: None,
                })
                .unwrap();
            ledger.open_material(id, depot, 0).unwrap();
            ids.push(id);
        }

        let sequences = Arc::new(SequenceGenerator::new());
        let requests = Arc::new(InMemoryRequestStore::in_memory(
            sequences.clone(),
            catalog.clone(),
            sink.clone(),
        ));
        let processor = FulfillmentProcessor::new(
            requests.clone(),
            Arc::new(DeliveryNoteStore::new(sequences)),
            ledger.clone(),
            catalog,
            Arc::new(IdempotencyStore::new()),
            sink.clone(),
        );
        let validation = ValidationEngine::new(requests.clone(), ledger.clone(), sink);
        Fixture {
            processor,
            validation,
            requests,
            ledger,
            depot,
            cement: ids[0],
            sand: ids[1],
            events,
        }
    }

    fn approved(f: &Fixture, lines: &[(MaterielId, i64)], grants: Vec<LineGrant>) -> RequestId {
        let view = f
            .requests
            .create(NewRequest {
                depot_id: f.depot,
                requester: UserId::new(),
                priority: Priority::Normal,
                desired_date: None,
                comment: None,
                lines: lines
                    .iter()
                    .map(|(materiel_id, quantity)| NewLine {
                        materiel_id: *materiel_id,
                        quantity: *quantity,
                    })
                    .collect(),
            })
            .unwrap();
        f.validation
            .validate(view.id, UserId::new(), Decision::Approve { grants }, None)
            .unwrap();
        f.events.drain();
        view.id
    }

    fn stock(f: &Fixture, materiel_id: MaterielId, qty: i64) {
        f.ledger.manual_add(materiel_id, qty, ManualOp::new(UserId::new())).unwrap();
    }

    #[test]
    fn partial_grant_is_delivered_and_deducted() {
        let f = fixture();
        stock(&f, f.cement, 10);
        let id = approved(
            &f,
            &[(f.cement, 12)],
            vec![LineGrant {
                materiel_id: f.cement,
                quantity_granted: 8,
            }],
        );

        let note = f.processor.fulfill_from_request(id, UserId::new(), "k-1").unwrap();

        assert_eq!(note.numero().to_string(), "BL-0001");
        assert_eq!(note.request_id(), Some(id.0));
        assert_eq!(note.lines().len(), 1);
        assert_eq!(note.lines()[0].quantity, 8);
        assert_eq!(note.lines()[0].unit_price, 4_500);
        assert_eq!(note.lines()[0].designation, "Ciment CPJ45");

        assert_eq!(f.ledger.stock_level(f.cement).unwrap(), 2);
        let out: Vec<_> = f
            .ledger
            .movements_for(f.cement, DateRange::all())
            .unwrap()
            .filter(|m| m.reason == MovementReason::FulfillmentOut)
            .collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].delta, -8);
        assert_eq!(out[0].related, Some(MovementRef::DeliveryNote(note.id_typed().0)));

        let request = f.requests.get(id).unwrap();
        assert_eq!(request.status, RequestStatus::Delivered);
        assert_eq!(request.delivery_note_id, Some(note.id_typed().0));
        assert!(matches!(f.events.try_recv(), Ok(DomainEvent::DeliveryNoteIssued { .. })));
    }

    #[test]
    fn zero_grants_produce_no_line() {
        let f = fixture();
        stock(&f, f.cement, 5);
        stock(&f, f.sand, 5);
        let id = approved(
            &f,
            &[(f.cement, 2), (f.sand, 3)],
            vec![LineGrant {
                materiel_id: f.cement,
                quantity_granted: 0,
            }],
        );

        let note = f.processor.fulfill_from_request(id, UserId::new(), "k-1").unwrap();
        assert_eq!(note.lines().len(), 1);
        assert_eq!(note.lines()[0].materiel_id, f.sand);
        assert_eq!(note.lines()[0].line_no, 1);
        assert_eq!(f.ledger.stock_level(f.cement).unwrap(), 5);
        assert_eq!(f.ledger.stock_level(f.sand).unwrap(), 2);
    }

    #[test]
    fn shortage_on_any_line_commits_nothing() {
        let f = fixture();
        stock(&f, f.cement, 10);
        stock(&f, f.sand, 1);
        let id = approved(&f, &[(f.cement, 4), (f.sand, 2)], vec![]);

        let err = f
            .processor
            .fulfill_from_request(id, UserId::new(), "k-1")
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InsufficientStock));

        assert_eq!(f.ledger.stock_level(f.cement).unwrap(), 10);
        assert_eq!(f.ledger.stock_level(f.sand).unwrap(), 1);
        assert_eq!(f.requests.get(id).unwrap().status, RequestStatus::Approved);

        // The failed key is released; a retry after restocking succeeds.
        stock(&f, f.sand, 1);
        let note = f.processor.fulfill_from_request(id, UserId::new(), "k-1").unwrap();
        assert_eq!(note.numero().sequence(), 1);
    }

    #[test]
    fn replayed_key_is_already_processed() {
        let f = fixture();
        stock(&f, f.cement, 10);
        let order = DirectDistribution {
            depot_id: f.depot,
            issuer: UserId::new(),
            recipient: UserId::new(),
            lines: vec![NewLine {
                materiel_id: f.cement,
                quantity: 3,
            }],
            comment: Some("équipe coffrage".into()),
        };

        let note = f.processor.fulfill_direct(order.clone(), "dist-1").unwrap();
        assert!(note.is_direct());

        let err = f.processor.fulfill_direct(order, "dist-1").unwrap_err();
        match err {
            ServiceError::Domain(DomainError::AlreadyProcessed(msg)) => assert!(msg.contains("BL-0001")),
            other => panic!("Expected AlreadyProcessed, got {other:?}"),
        }
        assert_eq!(f.ledger.stock_level(f.cement).unwrap(), 7);
    }

    #[test]
    fn direct_lines_are_validated() {
        let f = fixture();
        stock(&f, f.cement, 10);
        let mut order = DirectDistribution {
            depot_id: f.depot,
            issuer: UserId::new(),
            recipient: UserId::new(),
            lines: vec![],
            comment: None,
        };
        assert_eq!(
            f.processor.fulfill_direct(order.clone(), "a").unwrap_err().kind(),
            Some(ErrorKind::InvalidInput)
        );

        order.lines = vec![NewLine {
            materiel_id: MaterielId::new(),
            quantity: 1,
        }];
        assert_eq!(
            f.processor.fulfill_direct(order, "b").unwrap_err().kind(),
            Some(ErrorKind::InvalidInput)
        );
    }

    #[test]
    fn second_fulfilment_of_a_request_is_invalid_state() {
        let f = fixture();
        stock(&f, f.cement, 10);
        let id = approved(&f, &[(f.cement, 2)], vec![]);

        f.processor.fulfill_from_request(id, UserId::new(), "k-1").unwrap();
        let err = f
            .processor
            .fulfill_from_request(id, UserId::new(), "k-2")
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
        assert_eq!(f.ledger.stock_level(f.cement).unwrap(), 8);
    }

    #[test]
    fn pending_request_cannot_be_fulfilled() {
        let f = fixture();
        let view = f
            .requests
            .create(NewRequest {
                depot_id: f.depot,
                requester: UserId::new(),
                priority: Priority::Low,
                desired_date: None,
                comment: None,
                lines: vec![NewLine {
                    materiel_id: f.cement,
                    quantity: 1,
                }],
            })
            .unwrap();

        let err = f
            .processor
            .fulfill_from_request(view.id, UserId::new(), "k")
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
    }

    #[test]
    fn cancellation_returns_stock_with_corrections() {
        let f = fixture();
        stock(&f, f.cement, 10);
        stock(&f, f.sand, 10);
        let id = approved(&f, &[(f.cement, 4), (f.sand, 1)], vec![]);
        let note = f.processor.fulfill_from_request(id, UserId::new(), "k").unwrap();
        f.events.drain();

        let cancelled = f
            .processor
            .cancel_delivery_note(note.id_typed(), UserId::new(), None)
            .unwrap();

        assert_eq!(cancelled.status(), DeliveryNoteStatus::Cancelled);
        assert_eq!(cancelled.lines(), note.lines());
        assert_eq!(f.ledger.stock_level(f.cement).unwrap(), 10);
        assert_eq!(f.ledger.stock_level(f.sand).unwrap(), 10);
        let last = f
            .ledger
            .movements_for(f.cement, DateRange::all())
            .unwrap()
            .last()
            .unwrap();
        assert_eq!(last.reason, MovementReason::Correction);
        assert_eq!(last.delta, 4);
        assert_eq!(f.requests.get(id).unwrap().status, RequestStatus::Delivered);
        assert!(matches!(f.events.try_recv(), Ok(DomainEvent::DeliveryNoteCancelled { .. })));

        let again = f
            .processor
            .cancel_delivery_note(note.id_typed(), UserId::new(), None)
            .unwrap_err();
        assert_eq!(again.kind(), Some(ErrorKind::InvalidTransition));
        assert_eq!(f.ledger.stock_level(f.cement).unwrap(), 10);
    }
}
