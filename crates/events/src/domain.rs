//! Domain events handed to the messaging collaborator.
//!
//! These are notifications about committed facts, not the event-sourcing stream of
//! any aggregate. They cross the core's boundary through [`EventSink`], which is
//! fire-and-forget: an emission never fails or rolls back the operation that
//! produced it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use matflow_core::{AggregateId, DepotId, DocumentNumber, MaterielId, UserId};

use crate::{Event, EventBus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    RequestCreated {
        depot_id: DepotId,
        request_id: AggregateId,
        numero: DocumentNumber,
        requester: UserId,
        occurred_at: DateTime<Utc>,
    },
    RequestApproved {
        depot_id: DepotId,
        request_id: AggregateId,
        numero: DocumentNumber,
        requester: UserId,
        reviewer: UserId,
        /// True when at least one line was granted less than requested.
        partial: bool,
        occurred_at: DateTime<Utc>,
    },
    RequestRejected {
        depot_id: DepotId,
        request_id: AggregateId,
        numero: DocumentNumber,
        requester: UserId,
        reviewer: UserId,
        comment: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    DeliveryNoteIssued {
        depot_id: DepotId,
        delivery_note_id: AggregateId,
        numero: DocumentNumber,
        request_id: Option<AggregateId>,
        recipient: UserId,
        occurred_at: DateTime<Utc>,
    },
    DeliveryNoteCancelled {
        depot_id: DepotId,
        delivery_note_id: AggregateId,
        numero: DocumentNumber,
        cancelled_by: UserId,
        occurred_at: DateTime<Utc>,
    },
    LowStock {
        depot_id: DepotId,
        materiel_id: MaterielId,
        stock_current: i64,
        stock_minimum: i64,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn depot_id(&self) -> DepotId {
        match self {
            DomainEvent::RequestCreated { depot_id, .. }
            | DomainEvent::RequestApproved { depot_id, .. }
            | DomainEvent::RequestRejected { depot_id, .. }
            | DomainEvent::DeliveryNoteIssued { depot_id, .. }
            | DomainEvent::DeliveryNoteCancelled { depot_id, .. }
            | DomainEvent::LowStock { depot_id, .. } => *depot_id,
        }
    }
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::RequestCreated { .. } => "request.created",
            DomainEvent::RequestApproved { .. } => "request.approved",
            DomainEvent::RequestRejected { .. } => "request.rejected",
            DomainEvent::DeliveryNoteIssued { .. } => "delivery_note.issued",
            DomainEvent::DeliveryNoteCancelled { .. } => "delivery_note.cancelled",
            DomainEvent::LowStock { .. } => "stock.low",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::RequestCreated { occurred_at, .. }
            | DomainEvent::RequestApproved { occurred_at, .. }
            | DomainEvent::RequestRejected { occurred_at, .. }
            | DomainEvent::DeliveryNoteIssued { occurred_at, .. }
            | DomainEvent::DeliveryNoteCancelled { occurred_at, .. }
            | DomainEvent::LowStock { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Fire-and-forget outlet for domain events.
///
/// Implementations must not block on delivery and must swallow (and log) their own
/// failures.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

impl<S> EventSink for Arc<S>
where
    S: EventSink + ?Sized,
{
    fn emit(&self, event: DomainEvent) {
        (**self).emit(event)
    }
}

/// [`EventSink`] backed by an [`EventBus`].
#[derive(Debug)]
pub struct BusEventSink<B> {
    bus: B,
}

impl<B> BusEventSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> EventSink for BusEventSink<B>
where
    B: EventBus<DomainEvent>,
{
    fn emit(&self, event: DomainEvent) {
        let event_type = event.event_type();
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(event_type, error = ?err, "domain event publication failed");
        }
    }
}
