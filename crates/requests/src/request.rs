use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use matflow_core::{
    Aggregate, AggregateId, AggregateRoot, DepotId, DocumentKind, DocumentNumber, DomainError,
    UserId,
};
use matflow_events::Event;

use crate::lines::{GrantedLine, LineGrant, NewLine, RequestLine, resolve_grants, validate_new_lines};
use crate::status::{Priority, RequestStatus};

/// Material request identifier (depot-scoped via `depot_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub AggregateId);

impl RequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: MaterialRequest (demande de matériaux).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRequest {
    id: RequestId,
    depot_id: Option<DepotId>,
    numero: Option<DocumentNumber>,
    requester: Option<UserId>,
    status: RequestStatus,
    priority: Priority,
    requested_on: Option<DateTime<Utc>>,
    desired_date: Option<NaiveDate>,
    comment: Option<String>,
    reviewer: Option<UserId>,
    reviewer_comment: Option<String>,
    validated_at: Option<DateTime<Utc>>,
    delivery_note_id: Option<AggregateId>,
    delivered_at: Option<DateTime<Utc>>,
    lines: Vec<RequestLine>,
    version: u64,
    created: bool,
}

impl MaterialRequest {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            depot_id: None,
            numero: None,
            requester: None,
            status: RequestStatus::Pending,
            priority: Priority::default(),
            requested_on: None,
            desired_date: None,
            comment: None,
            reviewer: None,
            reviewer_comment: None,
            validated_at: None,
            delivery_note_id: None,
            delivered_at: None,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RequestId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn depot_id(&self) -> Option<DepotId> {
        self.depot_id
    }

    pub fn numero(&self) -> Option<DocumentNumber> {
        self.numero
    }

    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn requested_on(&self) -> Option<DateTime<Utc>> {
        self.requested_on
    }

    pub fn desired_date(&self) -> Option<NaiveDate> {
        self.desired_date
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn reviewer(&self) -> Option<UserId> {
        self.reviewer
    }

    pub fn reviewer_comment(&self) -> Option<&str> {
        self.reviewer_comment.as_deref()
    }

    pub fn validated_at(&self) -> Option<DateTime<Utc>> {
        self.validated_at
    }

    pub fn delivery_note_id(&self) -> Option<AggregateId> {
        self.delivery_note_id
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn lines(&self) -> &[RequestLine] {
        &self.lines
    }

    /// Lines that will leave the depot on fulfilment (granted > 0), in line order.
    pub fn lines_to_deliver(&self) -> impl Iterator<Item = (&RequestLine, i64)> {
        self.lines.iter().filter_map(|l| match l.quantity_granted {
            Some(q) if q > 0 => Some((l, q)),
            _ => None,
        })
    }
}

impl AggregateRoot for MaterialRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub numero: DocumentNumber,
    pub requester: UserId,
    pub priority: Priority,
    pub desired_date: Option<NaiveDate>,
    pub comment: Option<String>,
    pub lines: Vec<NewLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveRequest. Lines absent from `grants` are granted in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub reviewer: UserId,
    pub grants: Vec<LineGrant>,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequest {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub reviewer: UserId,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub delivery_note_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestCommand {
    CreateRequest(CreateRequest),
    ApproveRequest(ApproveRequest),
    RejectRequest(RejectRequest),
    MarkDelivered(MarkDelivered),
}

impl RequestCommand {
    /// Status the command moves the request into.
    pub fn target_status(&self) -> RequestStatus {
        match self {
            RequestCommand::CreateRequest(_) => RequestStatus::Pending,
            RequestCommand::ApproveRequest(_) => RequestStatus::Approved,
            RequestCommand::RejectRequest(_) => RequestStatus::Rejected,
            RequestCommand::MarkDelivered(_) => RequestStatus::Delivered,
        }
    }
}

/// Event: RequestCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCreated {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub numero: DocumentNumber,
    pub requester: UserId,
    pub priority: Priority,
    pub desired_date: Option<NaiveDate>,
    pub comment: Option<String>,
    pub lines: Vec<RequestLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproved {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub reviewer: UserId,
    pub grants: Vec<GrantedLine>,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRejected {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub reviewer: UserId,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDelivered {
    pub depot_id: DepotId,
    pub request_id: RequestId,
    pub delivery_note_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestEvent {
    RequestCreated(RequestCreated),
    RequestApproved(RequestApproved),
    RequestRejected(RequestRejected),
    RequestDelivered(RequestDelivered),
}

impl RequestEvent {
    pub fn depot_id(&self) -> DepotId {
        match self {
            RequestEvent::RequestCreated(e) => e.depot_id,
            RequestEvent::RequestApproved(e) => e.depot_id,
            RequestEvent::RequestRejected(e) => e.depot_id,
            RequestEvent::RequestDelivered(e) => e.depot_id,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            RequestEvent::RequestCreated(e) => e.request_id,
            RequestEvent::RequestApproved(e) => e.request_id,
            RequestEvent::RequestRejected(e) => e.request_id,
            RequestEvent::RequestDelivered(e) => e.request_id,
        }
    }
}

impl Event for RequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RequestEvent::RequestCreated(_) => "request.created",
            RequestEvent::RequestApproved(_) => "request.approved",
            RequestEvent::RequestRejected(_) => "request.rejected",
            RequestEvent::RequestDelivered(_) => "request.delivered",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequestEvent::RequestCreated(e) => e.occurred_at,
            RequestEvent::RequestApproved(e) => e.occurred_at,
            RequestEvent::RequestRejected(e) => e.occurred_at,
            RequestEvent::RequestDelivered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for MaterialRequest {
    type Command = RequestCommand;
    type Event = RequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RequestEvent::RequestCreated(e) => {
                self.id = e.request_id;
                self.depot_id = Some(e.depot_id);
                self.numero = Some(e.numero);
                self.requester = Some(e.requester);
                self.status = RequestStatus::Pending;
                self.priority = e.priority;
                self.requested_on = Some(e.occurred_at);
                self.desired_date = e.desired_date;
                self.comment = e.comment.clone();
                self.lines = e.lines.clone();
                self.created = true;
            }
            RequestEvent::RequestApproved(e) => {
                for g in &e.grants {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == g.line_no) {
                        line.quantity_granted = Some(g.quantity_granted);
                    }
                }
                self.status = RequestStatus::Approved;
                self.reviewer = Some(e.reviewer);
                self.reviewer_comment = e.comment.clone();
                self.validated_at = Some(e.occurred_at);
            }
            RequestEvent::RequestRejected(e) => {
                self.status = RequestStatus::Rejected;
                self.reviewer = Some(e.reviewer);
                self.reviewer_comment = e.comment.clone();
                self.validated_at = Some(e.occurred_at);
            }
            RequestEvent::RequestDelivered(e) => {
                self.status = RequestStatus::Delivered;
                self.delivery_note_id = Some(e.delivery_note_id);
                self.delivered_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RequestCommand::CreateRequest(cmd) => self.handle_create(cmd),
            RequestCommand::ApproveRequest(cmd) => self.handle_approve(cmd),
            RequestCommand::RejectRequest(cmd) => self.handle_reject(cmd),
            RequestCommand::MarkDelivered(cmd) => self.handle_mark_delivered(cmd),
        }
    }
}

impl MaterialRequest {
    /// Common guard for commands on an existing request.
    fn ensure_target(&self, depot_id: DepotId, request_id: RequestId) -> Result<(), DomainError> {
        // A request of another depot is indistinguishable from a missing one.
        if !self.created || self.depot_id != Some(depot_id) {
            return Err(DomainError::not_found(format!("request {request_id}")));
        }
        if self.id != request_id {
            return Err(DomainError::invalid_input("request_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateRequest) -> Result<Vec<RequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("request already exists"));
        }
        if cmd.numero.kind() != DocumentKind::Request {
            return Err(DomainError::invalid_input(format!(
                "{} is not a request number",
                cmd.numero
            )));
        }
        validate_new_lines(&cmd.lines)?;

        let lines = cmd
            .lines
            .iter()
            .enumerate()
            .map(|(idx, l)| RequestLine {
                line_no: idx as u32 + 1,
                materiel_id: l.materiel_id,
                quantity_requested: l.quantity,
                quantity_granted: None,
            })
            .collect();

        Ok(vec![RequestEvent::RequestCreated(RequestCreated {
            depot_id: cmd.depot_id,
            request_id: cmd.request_id,
            numero: cmd.numero,
            requester: cmd.requester,
            priority: cmd.priority,
            desired_date: cmd.desired_date,
            comment: cmd.comment.clone(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_target(cmd.depot_id, cmd.request_id)?;
        self.status.ensure_transition(RequestStatus::Approved)?;

        let grants = resolve_grants(&self.lines, &cmd.grants)?;

        Ok(vec![RequestEvent::RequestApproved(RequestApproved {
            depot_id: cmd.depot_id,
            request_id: cmd.request_id,
            reviewer: cmd.reviewer,
            grants,
            comment: cmd.comment.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectRequest) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_target(cmd.depot_id, cmd.request_id)?;
        self.status.ensure_transition(RequestStatus::Rejected)?;

        Ok(vec![RequestEvent::RequestRejected(RequestRejected {
            depot_id: cmd.depot_id,
            request_id: cmd.request_id,
            reviewer: cmd.reviewer,
            comment: cmd.comment.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_delivered(&self, cmd: &MarkDelivered) -> Result<Vec<RequestEvent>, DomainError> {
        self.ensure_target(cmd.depot_id, cmd.request_id)?;
        self.status.ensure_transition(RequestStatus::Delivered)?;

        Ok(vec![RequestEvent::RequestDelivered(RequestDelivered {
            depot_id: cmd.depot_id,
            request_id: cmd.request_id,
            delivery_note_id: cmd.delivery_note_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
