use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use matflow_core::{AggregateId, DepotId, DocumentNumber, UserId};
use matflow_events::EventEnvelope;
use matflow_requests::{Priority, RequestEvent, RequestId, RequestLine, RequestStatus};

use crate::read_model::DepotStore;

/// Queryable request read model.
///
/// Aggregates (line count, totals) are computed on read, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestView {
    pub id: RequestId,
    pub depot_id: DepotId,
    pub numero: DocumentNumber,
    pub requester: UserId,
    pub status: RequestStatus,
    pub priority: Priority,
    pub requested_on: DateTime<Utc>,
    pub desired_date: Option<NaiveDate>,
    pub comment: Option<String>,
    pub reviewer: Option<UserId>,
    pub reviewer_comment: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub delivery_note_id: Option<AggregateId>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub lines: Vec<RequestLine>,
    /// Stream revision this view reflects.
    pub version: u64,
}

impl RequestView {
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn total_requested(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity_requested).sum()
    }

    /// `None` until the request has been approved.
    pub fn total_granted(&self) -> Option<i64> {
        if self.lines.iter().all(|l| l.quantity_granted.is_none()) {
            return None;
        }
        Some(self.lines.iter().filter_map(|l| l.quantity_granted).sum())
    }

    pub fn is_partially_granted(&self) -> bool {
        self.lines
            .iter()
            .any(|l| l.quantity_granted.is_some_and(|g| g < l.quantity_requested))
    }
}

/// Filter for [`RequestProjection::list`]. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub depot_id: Option<DepotId>,
    pub requester: Option<UserId>,
}

impl RequestFilter {
    pub fn matches(&self, view: &RequestView) -> bool {
        self.status.is_none_or(|s| view.status == s)
            && self.depot_id.is_none_or(|d| view.depot_id == d)
            && self.requester.is_none_or(|r| view.requester == r)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    depot_id: DepotId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum RequestProjectionError {
    #[error("failed to deserialize request event: {0}")]
    Deserialize(String),

    #[error("depot isolation violation: {0}")]
    DepotIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown request {0}")]
    UnknownRequest(RequestId),
}

/// Material request projection.
#[derive(Debug)]
pub struct RequestProjection<S>
where
    S: DepotStore<RequestId, RequestView>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    /// Request → depot, so lookups by id alone stay O(1).
    index: RwLock<HashMap<RequestId, DepotId>>,
}

impl<S> RequestProjection<S>
where
    S: DepotStore<RequestId, RequestView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, request_id: RequestId) -> Option<RequestView> {
        let depot_id = *self.index.read().get(&request_id)?;
        self.store.get(depot_id, &request_id)
    }

    /// Matching requests ordered by depot, then request number.
    pub fn list(&self, filter: &RequestFilter) -> Vec<RequestView> {
        let mut views = match filter.depot_id {
            Some(depot_id) => self.store.list(depot_id),
            None => self.store.list_all(),
        };
        views.retain(|v| filter.matches(v));
        views.sort_by_key(|v| (v.depot_id, v.numero));
        views
    }

    /// Apply a published envelope.
    ///
    /// Replays at or below the stream cursor are ignored; gaps are rejected.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), RequestProjectionError> {
        let depot_id = envelope.depot_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self.cursors.write();
        let key = CursorKey { depot_id, aggregate_id };
        let last = cursors.get(&key).copied().unwrap_or(0);

        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(RequestProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: RequestEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| RequestProjectionError::Deserialize(e.to_string()))?;

        if event.depot_id() != depot_id {
            return Err(RequestProjectionError::DepotIsolation(
                "event depot_id does not match envelope depot_id".to_string(),
            ));
        }
        let request_id = event.request_id();
        if request_id.0 != aggregate_id {
            return Err(RequestProjectionError::DepotIsolation(
                "event request_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let view = match event {
            RequestEvent::RequestCreated(e) => {
                self.index.write().insert(e.request_id, depot_id);
                RequestView {
                    id: e.request_id,
                    depot_id: e.depot_id,
                    numero: e.numero,
                    requester: e.requester,
                    status: RequestStatus::Pending,
                    priority: e.priority,
                    requested_on: e.occurred_at,
                    desired_date: e.desired_date,
                    comment: e.comment,
                    reviewer: None,
                    reviewer_comment: None,
                    validated_at: None,
                    delivery_note_id: None,
                    delivered_at: None,
                    lines: e.lines,
                    version: seq,
                }
            }
            other => {
                let mut view = self
                    .store
                    .get(depot_id, &request_id)
                    .ok_or(RequestProjectionError::UnknownRequest(request_id))?;
                apply_update(&mut view, other);
                view.version = seq;
                view
            }
        };

        self.store.upsert(depot_id, request_id, view);
        cursors.insert(key, seq);
        Ok(())
    }

    /// Rebuild from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), RequestProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        self.cursors.write().clear();
        self.index.write().clear();

        let mut depots: Vec<DepotId> = envs.iter().map(|e| e.depot_id()).collect();
        depots.sort();
        depots.dedup();
        for d in depots {
            self.store.clear_depot(d);
        }

        // Deterministic replay order: depot, aggregate, sequence.
        envs.sort_by_key(|e| (e.depot_id(), e.aggregate_id(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn apply_update(view: &mut RequestView, event: RequestEvent) {
    match event {
        RequestEvent::RequestCreated(_) => {}
        RequestEvent::RequestApproved(e) => {
            for g in e.grants {
                if let Some(line) = view.lines.iter_mut().find(|l| l.line_no == g.line_no) {
                    line.quantity_granted = Some(g.quantity_granted);
                }
            }
            view.status = RequestStatus::Approved;
            view.reviewer = Some(e.reviewer);
            view.reviewer_comment = e.comment;
            view.validated_at = Some(e.occurred_at);
        }
        RequestEvent::RequestRejected(e) => {
            view.status = RequestStatus::Rejected;
            view.reviewer = Some(e.reviewer);
            view.reviewer_comment = e.comment;
            view.validated_at = Some(e.occurred_at);
        }
        RequestEvent::RequestDelivered(e) => {
            view.status = RequestStatus::Delivered;
            view.delivery_note_id = Some(e.delivery_note_id);
            view.delivered_at = Some(e.occurred_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use matflow_core::{DocumentKind, MaterielId};
    use matflow_requests::{GrantedLine, RequestApproved, RequestCreated};
    use uuid::Uuid;

    use crate::read_model::InMemoryDepotStore;

    type Projection = RequestProjection<Arc<InMemoryDepotStore<RequestId, RequestView>>>;

    fn projection() -> Projection {
        RequestProjection::new(Arc::new(InMemoryDepotStore::new()))
    }

    fn envelope(depot_id: DepotId, seq: u64, event: &RequestEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            depot_id,
            event.request_id().0,
            "request",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn created(depot_id: DepotId, request_id: RequestId, seq: u64) -> RequestEvent {
        RequestEvent::RequestCreated(RequestCreated {
            depot_id,
            request_id,
            numero: DocumentNumber::new(DocumentKind::Request, seq).unwrap(),
            requester: UserId::new(),
            priority: Priority::Normal,
            desired_date: None,
            comment: None,
            lines: vec![
                RequestLine {
                    line_no: 1,
                    materiel_id: MaterielId::new(),
                    quantity_requested: 12,
                    quantity_granted: None,
                },
                RequestLine {
                    line_no: 2,
                    materiel_id: MaterielId::new(),
                    quantity_requested: 3,
                    quantity_granted: None,
                },
            ],
            occurred_at: Utc::now(),
        })
    }

    fn approved(depot_id: DepotId, request_id: RequestId) -> RequestEvent {
        RequestEvent::RequestApproved(RequestApproved {
            depot_id,
            request_id,
            reviewer: UserId::new(),
            grants: vec![
                GrantedLine { line_no: 1, quantity_granted: 8 },
                GrantedLine { line_no: 2, quantity_granted: 3 },
            ],
            comment: Some("partial".into()),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn builds_view_with_computed_totals() {
        let p = projection();
        let depot = DepotId::new();
        let id = RequestId::new(AggregateId::new());

        p.apply_envelope(&envelope(depot, 1, &created(depot, id, 1))).unwrap();
        let view = p.get(id).unwrap();
        assert_eq!(view.line_count(), 2);
        assert_eq!(view.total_requested(), 15);
        assert_eq!(view.total_granted(), None);

        p.apply_envelope(&envelope(depot, 2, &approved(depot, id))).unwrap();
        let view = p.get(id).unwrap();
        assert_eq!(view.status, RequestStatus::Approved);
        assert_eq!(view.total_granted(), Some(11));
        assert!(view.is_partially_granted());
        assert_eq!(view.version, 2);
    }

    #[test]
    fn replays_are_ignored_and_gaps_rejected() {
        let p = projection();
        let depot = DepotId::new();
        let id = RequestId::new(AggregateId::new());
        let env = envelope(depot, 1, &created(depot, id, 1));

        p.apply_envelope(&env).unwrap();
        p.apply_envelope(&env).unwrap();
        assert_eq!(p.get(id).unwrap().version, 1);

        let gap = envelope(depot, 3, &approved(depot, id));
        assert!(matches!(
            p.apply_envelope(&gap),
            Err(RequestProjectionError::NonMonotonicSequence { last: 1, found: 3 })
        ));
    }

    #[test]
    fn list_filters_and_orders_by_numero() {
        let p = projection();
        let depot = DepotId::new();
        let other = DepotId::new();
        let first = RequestId::new(AggregateId::new());
        let second = RequestId::new(AggregateId::new());
        let elsewhere = RequestId::new(AggregateId::new());

        p.apply_envelope(&envelope(depot, 1, &created(depot, second, 2))).unwrap();
        p.apply_envelope(&envelope(depot, 1, &created(depot, first, 1))).unwrap();
        p.apply_envelope(&envelope(other, 1, &created(other, elsewhere, 1))).unwrap();
        p.apply_envelope(&envelope(depot, 2, &approved(depot, first))).unwrap();

        let in_depot = p.list(&RequestFilter {
            depot_id: Some(depot),
            ..Default::default()
        });
        assert_eq!(in_depot.iter().map(|v| v.id).collect::<Vec<_>>(), vec![first, second]);

        let pending = p.list(&RequestFilter {
            status: Some(RequestStatus::Pending),
            ..Default::default()
        });
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|v| v.id != first));
    }

    #[test]
    fn rebuild_reproduces_the_same_views() {
        let p = projection();
        let depot = DepotId::new();
        let id = RequestId::new(AggregateId::new());
        let envs = vec![
            envelope(depot, 2, &approved(depot, id)),
            envelope(depot, 1, &created(depot, id, 1)),
        ];

        p.rebuild_from_scratch(envs.clone()).unwrap();
        let first = p.get(id).unwrap();
        p.rebuild_from_scratch(envs).unwrap();

        assert_eq!(p.get(id).unwrap(), first);
        assert_eq!(first.status, RequestStatus::Approved);
    }
}
