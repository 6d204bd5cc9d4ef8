//! Request lifecycle: creation, lookup and the internal status transitions.
//!
//! Writes go through the [`CommandDispatcher`]; the committed envelopes are then
//! applied to the request projection before the call returns, so a caller always
//! reads its own writes.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use matflow_core::{AggregateId, DepotId, DocumentKind, DomainError, DomainResult, UserId};
use matflow_events::{DomainEvent, EventBus, EventEnvelope, EventSink, InMemoryEventBus};
use matflow_requests::{
    ApproveRequest, CreateRequest, LineGrant, MarkDelivered, MaterialRequest, NewLine, Priority,
    RejectRequest, RequestCommand, RequestId, validate_new_lines,
};

use crate::catalog::CatalogLookup;
use crate::command_dispatcher::CommandDispatcher;
use crate::error::{ServiceError, ServiceResult};
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent, StreamId};
use crate::locks::KeyedLocks;
use crate::projections::{RequestFilter, RequestProjection, RequestView};
use crate::read_model::InMemoryDepotStore;
use crate::sequence::SequenceGenerator;

pub const REQUEST_AGGREGATE: &str = "material_request";

fn fresh_request(stream: StreamId) -> MaterialRequest {
    MaterialRequest::empty(RequestId::new(stream.aggregate_id))
}

/// Input of [`RequestStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub depot_id: DepotId,
    pub requester: UserId,
    pub priority: Priority,
    pub desired_date: Option<NaiveDate>,
    pub comment: Option<String>,
    pub lines: Vec<NewLine>,
}

/// Status change requested by the validation and fulfilment services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTransition {
    Approve {
        reviewer: UserId,
        grants: Vec<LineGrant>,
        comment: Option<String>,
    },
    Reject {
        reviewer: UserId,
        comment: Option<String>,
    },
    Deliver {
        delivery_note_id: AggregateId,
    },
}

pub struct RequestStore<S, B> {
    dispatcher: CommandDispatcher<S, B>,
    projection: RequestProjection<InMemoryDepotStore<RequestId, RequestView>>,
    sequences: Arc<SequenceGenerator>,
    catalog: Arc<dyn CatalogLookup>,
    sink: Arc<dyn EventSink>,
    locks: KeyedLocks<RequestId>,
}

pub type InMemoryRequestStore =
    RequestStore<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

impl InMemoryRequestStore {
    pub fn in_memory(
        sequences: Arc<SequenceGenerator>,
        catalog: Arc<dyn CatalogLookup>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        );
        RequestStore::new(dispatcher, sequences, catalog, sink)
    }
}

impl<S, B> RequestStore<S, B> {
    pub fn new(
        dispatcher: CommandDispatcher<S, B>,
        sequences: Arc<SequenceGenerator>,
        catalog: Arc<dyn CatalogLookup>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            dispatcher,
            projection: RequestProjection::new(InMemoryDepotStore::new()),
            sequences,
            catalog,
            sink,
            locks: KeyedLocks::new(),
        }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Per-request lock serialising validation and fulfilment.
    pub fn lock(&self, request_id: RequestId) -> Arc<Mutex<()>> {
        self.locks.get(request_id)
    }

    pub fn get(&self, request_id: RequestId) -> DomainResult<RequestView> {
        self.projection
            .get(request_id)
            .ok_or_else(|| DomainError::not_found(format!("request {request_id}")))
    }

    pub fn list(&self, filter: &RequestFilter) -> Vec<RequestView> {
        self.projection.list(filter)
    }
}

impl<S, B> RequestStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Create a `pending` request numbered `DEM-xxxx` within its depot.
    pub fn create(&self, new: NewRequest) -> ServiceResult<RequestView> {
        validate_new_lines(&new.lines)?;
        let materiels: Vec<_> = new.lines.iter().map(|l| l.materiel_id).collect();
        self.catalog.resolve_lines(new.depot_id, &materiels)?;

        let request_id = RequestId::new(AggregateId::new());
        let depot_id = new.depot_id;

        let view = self
            .sequences
            .allocate(depot_id, DocumentKind::Request, |numero| {
                let committed = self.dispatcher.dispatch(
                    StreamId::new(depot_id, request_id.0),
                    REQUEST_AGGREGATE,
                    RequestCommand::CreateRequest(CreateRequest {
                        depot_id,
                        request_id,
                        numero,
                        requester: new.requester,
                        priority: new.priority,
                        desired_date: new.desired_date,
                        comment: new.comment,
                        lines: new.lines,
                        occurred_at: Utc::now(),
                    }),
                    fresh_request,
                )?;
                self.project(&committed)?;
                Ok::<_, ServiceError>(self.get(request_id)?)
            })?;

        tracing::info!(
            request_id = %view.id,
            numero = %view.numero,
            depot_id = %view.depot_id,
            lines = view.line_count(),
            "request created"
        );
        self.sink.emit(DomainEvent::RequestCreated {
            depot_id,
            request_id: view.id.0,
            numero: view.numero,
            requester: view.requester,
            occurred_at: view.requested_on,
        });
        Ok(view)
    }

    /// Move a request through its state machine.
    ///
    /// Internal to the validation and fulfilment services, which hold the request
    /// lock around it. Moves the state machine forbids fail `InvalidTransition`.
    pub fn transition(&self, request_id: RequestId, transition: RequestTransition) -> ServiceResult<RequestView> {
        let current = self.get(request_id)?;
        let depot_id = current.depot_id;
        let occurred_at = Utc::now();

        let command = match transition {
            RequestTransition::Approve {
                reviewer,
                grants,
                comment,
            } => RequestCommand::ApproveRequest(ApproveRequest {
                depot_id,
                request_id,
                reviewer,
                grants,
                comment,
                occurred_at,
            }),
            RequestTransition::Reject { reviewer, comment } => RequestCommand::RejectRequest(RejectRequest {
                depot_id,
                request_id,
                reviewer,
                comment,
                occurred_at,
            }),
            RequestTransition::Deliver { delivery_note_id } => RequestCommand::MarkDelivered(MarkDelivered {
                depot_id,
                request_id,
                delivery_note_id,
                occurred_at,
            }),
        };
        let target = command.target_status();

        let committed =
            self.dispatcher
                .dispatch(StreamId::new(depot_id, request_id.0), REQUEST_AGGREGATE, command, fresh_request)?;
        self.project(&committed)?;

        tracing::info!(
            %request_id,
            numero = %current.numero,
            from = %current.status,
            to = %target,
            "request transitioned"
        );
        Ok(self.get(request_id)?)
    }

    fn project(&self, committed: &[StoredEvent]) -> ServiceResult<()> {
        for stored in committed {
            self.projection
                .apply_envelope(&stored.to_envelope())
                .map_err(|e| ServiceError::storage(format!("request projection: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, MaterialInfo};
    use matflow_core::{ErrorKind, MaterielId};
    use matflow_events::{BusEventSink, Subscription};
    use matflow_requests::RequestStatus;

    struct Fixture {
        store: InMemoryRequestStore,
        depot: DepotId,
        cement: MaterielId,
        sand: MaterielId,
        events: Subscription<DomainEvent>,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(InMemoryCatalog::new());
        let depot = DepotId::new();
        let register = |name: &str| {
            let id = MaterielId::new();
            catalog
                .register_material(MaterialInfo {
                    id,
                    depot_id: depot,
                    name: name.into(),
                    unit: "sac".into(),
                    unit_price: 100,
                    category_id: None,
                })
                .unwrap();
            id
        };
        let cement = register("Ciment");
        let sand = register("Sable");

        let bus = InMemoryEventBus::<DomainEvent>::new();
        let events = bus.subscribe();
        let store = InMemoryRequestStore::in_memory(
            Arc::new(SequenceGenerator::new()),
            catalog,
            Arc::new(BusEventSink::new(bus)),
        );
        Fixture {
            store,
            depot,
            cement,
            sand,
            events,
        }
    }

    fn new_request(f: &Fixture, lines: Vec<NewLine>) -> NewRequest {
        NewRequest {
            depot_id: f.depot,
            requester: UserId::new(),
            priority: Priority::default(),
            desired_date: None,
            comment: Some("dalle R+1".into()),
            lines,
        }
    }

    fn line(materiel_id: MaterielId, quantity: i64) -> NewLine {
        NewLine { materiel_id, quantity }
    }

    #[test]
    fn create_numbers_requests_and_starts_pending() {
        let f = fixture();

        let first = f
            .store
            .create(new_request(&f, vec![line(f.cement, 12), line(f.sand, 3)]))
            .unwrap();
        let second = f.store.create(new_request(&f, vec![line(f.sand, 1)])).unwrap();

        assert_eq!(first.numero.to_string(), "DEM-0001");
        assert_eq!(second.numero.to_string(), "DEM-0002");
        assert_eq!(first.status, RequestStatus::Pending);
        assert_eq!(first.line_count(), 2);
        assert_eq!(first.total_requested(), 15);
        assert_eq!(first.total_granted(), None);
        assert!(matches!(f.events.try_recv(), Ok(DomainEvent::RequestCreated { .. })));
    }

    #[test]
    fn invalid_lines_are_rejected_without_consuming_a_number() {
        let f = fixture();

        let cases = vec![
            vec![],
            vec![line(f.cement, 0)],
            vec![line(f.cement, 2), line(f.cement, 1)],
            vec![line(MaterielId::new(), 1)],
        ];
        for lines in cases {
            let err = f.store.create(new_request(&f, lines)).unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::InvalidInput));
        }

        let ok = f.store.create(new_request(&f, vec![line(f.cement, 1)])).unwrap();
        assert_eq!(ok.numero.sequence(), 1);
    }

    #[test]
    fn transitions_follow_the_state_machine() {
        let f = fixture();
        let req = f.store.create(new_request(&f, vec![line(f.cement, 12)])).unwrap();

        let approved = f
            .store
            .transition(
                req.id,
                RequestTransition::Approve {
                    reviewer: UserId::new(),
                    grants: vec![LineGrant {
                        materiel_id: f.cement,
                        quantity_granted: 8,
                    }],
                    comment: None,
                },
            )
            .unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.total_granted(), Some(8));
        assert!(approved.is_partially_granted());

        let err = f
            .store
            .transition(
                req.id,
                RequestTransition::Reject {
                    reviewer: UserId::new(),
                    comment: None,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidTransition));

        let delivered = f
            .store
            .transition(
                req.id,
                RequestTransition::Deliver {
                    delivery_note_id: AggregateId::new(),
                },
            )
            .unwrap();
        assert_eq!(delivered.status, RequestStatus::Delivered);
        assert!(delivered.delivered_at.is_some());
    }

    #[test]
    fn list_filters_and_orders_by_numero() {
        let f = fixture();
        let a = f.store.create(new_request(&f, vec![line(f.cement, 1)])).unwrap();
        let b = f.store.create(new_request(&f, vec![line(f.sand, 1)])).unwrap();
        f.store
            .transition(
                a.id,
                RequestTransition::Reject {
                    reviewer: UserId::new(),
                    comment: Some("hors budget".into()),
                },
            )
            .unwrap();

        let all = f.store.list(&RequestFilter::default());
        assert_eq!(all.iter().map(|v| v.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        let pending = f.store.list(&RequestFilter {
            status: Some(RequestStatus::Pending),
            ..Default::default()
        });
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        assert!(matches!(
            f.store.get(RequestId::new(AggregateId::new())),
            Err(DomainError::NotFound(_))
        ));
    }
}
