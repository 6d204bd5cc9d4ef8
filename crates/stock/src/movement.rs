use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use matflow_core::{AggregateId, DepotId, DomainError, DomainResult, MaterielId, UserId};

/// Stock movement identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub Uuid);

impl MovementId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MovementId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Why a material's stock changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    ManualAdd,
    ManualRemove,
    FulfillmentOut,
    Correction,
}

impl MovementReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementReason::ManualAdd => "manual_add",
            MovementReason::ManualRemove => "manual_remove",
            MovementReason::FulfillmentOut => "fulfillment_out",
            MovementReason::Correction => "correction",
        }
    }

    /// Check the sign of `delta` against the reason.
    ///
    /// Additions are positive, removals and fulfilment outflows negative,
    /// corrections may go either way. Zero is never a movement.
    pub fn check_delta(self, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::invalid_input("delta cannot be zero"));
        }
        let ok = match self {
            MovementReason::ManualAdd => delta > 0,
            MovementReason::ManualRemove | MovementReason::FulfillmentOut => delta < 0,
            MovementReason::Correction => true,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::invalid_input(format!(
                "delta {delta} has the wrong sign for {}",
                self.as_str()
            )))
        }
    }
}

impl core::fmt::Display for MovementReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity a movement is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MovementRef {
    /// A delivery note (fulfilment or its cancellation).
    DeliveryNote(AggregateId),
    /// A manual operation, identified by the caller's operation key.
    Manual(String),
}

/// One signed, append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    /// Ledger-wide commit order. Strictly increasing across all materials.
    pub sequence: u64,
    pub materiel_id: MaterielId,
    pub depot_id: DepotId,
    pub delta: i64,
    pub reason: MovementReason,
    pub actor: UserId,
    pub related: Option<MovementRef>,
    /// Stock level right after this movement.
    pub balance_after: i64,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Inclusive time window for movement queries. Open on a side when unset.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> DomainResult<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(DomainError::invalid_input("date range starts after it ends"));
            }
        }
        Ok(Self { from, to })
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|f| at >= f) && self.to.is_none_or(|t| at <= t)
    }
}
