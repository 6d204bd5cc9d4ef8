use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use matflow_core::{
    AggregateId, DepotId, DocumentKind, DocumentNumber, DomainError, DomainResult, Entity,
    MaterielId, UserId,
};

/// Delivery note identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryNoteId(pub AggregateId);

impl DeliveryNoteId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DeliveryNoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Delivery note status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryNoteStatus {
    InPreparation,
    Delivered,
    Cancelled,
}

impl DeliveryNoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryNoteStatus::InPreparation => "in_preparation",
            DeliveryNoteStatus::Delivered => "delivered",
            DeliveryNoteStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: DeliveryNoteStatus) -> bool {
        matches!(
            (self, next),
            (DeliveryNoteStatus::InPreparation, DeliveryNoteStatus::Delivered)
                | (DeliveryNoteStatus::InPreparation, DeliveryNoteStatus::Cancelled)
                | (DeliveryNoteStatus::Delivered, DeliveryNoteStatus::Cancelled)
        )
    }
}

impl core::fmt::Display for DeliveryNoteStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for DeliveryNoteStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_preparation" => Ok(DeliveryNoteStatus::InPreparation),
            "delivered" => Ok(DeliveryNoteStatus::Delivered),
            "cancelled" => Ok(DeliveryNoteStatus::Cancelled),
            other => Err(DomainError::invalid_input(format!(
                "unknown delivery note status '{other}'"
            ))),
        }
    }
}

/// Frozen snapshot of one delivered line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNoteLine {
    pub line_no: u32,
    pub materiel_id: MaterielId,
    /// Catalog name at time of issue.
    pub designation: String,
    pub unit: String,
    pub quantity: i64,
    /// Price in smallest currency unit, at time of issue.
    pub unit_price: u64,
}

impl DeliveryNoteLine {
    pub fn amount(&self) -> u64 {
        self.unit_price.saturating_mul(self.quantity.max(0) as u64)
    }
}

/// Everything needed to issue a note, minus its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeliveryNote {
    pub id: DeliveryNoteId,
    pub depot_id: DepotId,
    pub request_id: Option<AggregateId>,
    pub issuer: UserId,
    pub recipient: UserId,
    pub delivery_date: NaiveDate,
    pub comment: Option<String>,
    pub lines: Vec<DeliveryNoteLine>,
    pub created_at: DateTime<Utc>,
}

/// Entity: DeliveryNote (bon de livraison).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryNote {
    id: DeliveryNoteId,
    depot_id: DepotId,
    numero: DocumentNumber,
    request_id: Option<AggregateId>,
    issuer: UserId,
    recipient: UserId,
    delivery_date: NaiveDate,
    status: DeliveryNoteStatus,
    created_at: DateTime<Utc>,
    comment: Option<String>,
    lines: Vec<DeliveryNoteLine>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<UserId>,
}

impl DeliveryNote {
    /// Issue a note for goods already handed over (status `delivered`).
    pub fn issue(new: NewDeliveryNote, numero: DocumentNumber) -> DomainResult<Self> {
        if numero.kind() != DocumentKind::DeliveryNote {
            return Err(DomainError::invalid_input(format!(
                "{numero} is not a delivery note number"
            )));
        }
        if new.lines.is_empty() {
            return Err(DomainError::invalid_input("a delivery note needs at least one line"));
        }
        for (idx, line) in new.lines.iter().enumerate() {
            if line.line_no != idx as u32 + 1 {
                return Err(DomainError::invalid_input(format!(
                    "line numbers must run from 1 (found {} at position {})",
                    line.line_no,
                    idx + 1
                )));
            }
            if line.quantity <= 0 {
                return Err(DomainError::invalid_input(format!(
                    "line {}: quantity must be positive",
                    line.line_no
                )));
            }
        }

        Ok(Self {
            id: new.id,
            depot_id: new.depot_id,
            numero,
            request_id: new.request_id,
            issuer: new.issuer,
            recipient: new.recipient,
            delivery_date: new.delivery_date,
            status: DeliveryNoteStatus::Delivered,
            created_at: new.created_at,
            comment: new.comment,
            lines: new.lines,
            cancelled_at: None,
            cancelled_by: None,
        })
    }

    pub fn id_typed(&self) -> DeliveryNoteId {
        self.id
    }

    pub fn depot_id(&self) -> DepotId {
        self.depot_id
    }

    pub fn numero(&self) -> DocumentNumber {
        self.numero
    }

    pub fn request_id(&self) -> Option<AggregateId> {
        self.request_id
    }

    pub fn issuer(&self) -> UserId {
        self.issuer
    }

    pub fn recipient(&self) -> UserId {
        self.recipient
    }

    pub fn delivery_date(&self) -> NaiveDate {
        self.delivery_date
    }

    pub fn status(&self) -> DeliveryNoteStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn lines(&self) -> &[DeliveryNoteLine] {
        &self.lines
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn cancelled_by(&self) -> Option<UserId> {
        self.cancelled_by
    }

    pub fn is_direct(&self) -> bool {
        self.request_id.is_none()
    }

    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn total_amount(&self) -> u64 {
        self.lines.iter().map(DeliveryNoteLine::amount).sum()
    }

    /// Mark the note cancelled. Lines stay as issued.
    pub fn cancel(&mut self, actor: UserId, at: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(DeliveryNoteStatus::Cancelled) {
            return Err(DomainError::invalid_transition(
                self.status,
                DeliveryNoteStatus::Cancelled,
            ));
        }
        self.status = DeliveryNoteStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.cancelled_by = Some(actor);
        Ok(())
    }
}

impl Entity for DeliveryNote {
    type Id = DeliveryNoteId;

    fn entity_id(&self) -> DeliveryNoteId {
        self.id
    }

    fn owning_depot(&self) -> DepotId {
        self.depot_id
    }
}
