//! Review of pending requests: approve with per-line grants, or reject.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use matflow_core::{DomainError, MaterielId, UserId};
use matflow_events::{DomainEvent, EventBus, EventEnvelope, EventSink};
use matflow_requests::{LineGrant, RequestId, RequestStatus};

use crate::error::ServiceResult;
use crate::event_store::EventStore;
use crate::ledger::StockLedger;
use crate::projections::RequestView;
use crate::request_store::{RequestStore, RequestTransition};

/// Reviewer's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Grants override individual lines; lines not named are granted in full.
    Approve { grants: Vec<LineGrant> },
    Reject,
}

/// Stock seen for one line at approval time. Advisory: nothing is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineAvailability {
    pub line_no: u32,
    pub materiel_id: MaterielId,
    pub quantity_granted: i64,
    pub stock_available: i64,
    pub sufficient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub request: RequestView,
    /// Empty for a rejection.
    pub availability: Vec<LineAvailability>,
}

pub struct ValidationEngine<S, B> {
    requests: Arc<RequestStore<S, B>>,
    ledger: Arc<StockLedger>,
    sink: Arc<dyn EventSink>,
}

impl<S, B> ValidationEngine<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(requests: Arc<RequestStore<S, B>>, ledger: Arc<StockLedger>, sink: Arc<dyn EventSink>) -> Self {
        Self { requests, ledger, sink }
    }

    /// Decide a pending request.
    ///
    /// Concurrent decisions on one request are serialised; the later one sees the
    /// request no longer pending and fails `InvalidState`.
    pub fn validate(
        &self,
        request_id: RequestId,
        reviewer: UserId,
        decision: Decision,
        comment: Option<String>,
    ) -> ServiceResult<ValidationOutcome> {
        let comment = comment.filter(|c| !c.trim().is_empty());

        let lock = self.requests.lock(request_id);
        let _guard = lock.lock();

        let current = self.requests.get(request_id)?;
        if current.status != RequestStatus::Pending {
            tracing::warn!(%request_id, status = %current.status, "validation of a non-pending request");
            return Err(DomainError::invalid_state(format!(
                "request {} is {}, expected pending",
                current.numero, current.status
            ))
            .into());
        }

        match decision {
            Decision::Approve { grants } => {
                let request = self.requests.transition(
                    request_id,
                    RequestTransition::Approve {
                        reviewer,
                        grants,
                        comment,
                    },
                )?;
                let availability = self.availability(&request);

                tracing::info!(
                    %request_id,
                    numero = %request.numero,
                    %reviewer,
                    total_granted = request.total_granted().unwrap_or(0),
                    "request approved"
                );
                self.sink.emit(DomainEvent::RequestApproved {
                    depot_id: request.depot_id,
                    request_id: request.id.0,
                    numero: request.numero,
                    requester: request.requester,
                    reviewer,
                    partial: request.is_partially_granted(),
                    occurred_at: request.validated_at.unwrap_or_else(chrono::Utc::now),
                });
                Ok(ValidationOutcome { request, availability })
            }
            Decision::Reject => {
                let request = self
                    .requests
                    .transition(request_id, RequestTransition::Reject { reviewer, comment })?;

                tracing::info!(%request_id, numero = %request.numero, %reviewer, "request rejected");
                self.sink.emit(DomainEvent::RequestRejected {
                    depot_id: request.depot_id,
                    request_id: request.id.0,
                    numero: request.numero,
                    requester: request.requester,
                    reviewer,
                    comment: request.reviewer_comment.clone(),
                    occurred_at: request.validated_at.unwrap_or_else(chrono::Utc::now),
                });
                Ok(ValidationOutcome {
                    request,
                    availability: Vec::new(),
                })
            }
        }
    }

    fn availability(&self, request: &RequestView) -> Vec<LineAvailability> {
        request
            .lines
            .iter()
            .map(|line| {
                let granted = line.quantity_granted.unwrap_or(0);
                // A material without a stock account has nothing to give.
                let available = self.ledger.stock_level(line.materiel_id).unwrap_or(0);
                tracing::debug!(
                    materiel_id = %line.materiel_id,
                    granted,
                    available,
                    "advisory availability"
                );
                LineAvailability {
                    line_no: line.line_no,
                    materiel_id: line.materiel_id,
                    quantity_granted: granted,
                    stock_available: available,
                    sufficient: available >= granted,
                }
            })
            .collect()
    }
}
