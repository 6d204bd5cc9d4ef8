use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use matflow_core::{DomainError, DomainResult, MaterielId};

use crate::movement::MovementReason;

/// One line of a multi-material stock transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub materiel_id: MaterielId,
    pub delta: i64,
}

impl StockAdjustment {
    pub fn new(materiel_id: MaterielId, delta: i64) -> Self {
        Self { materiel_id, delta }
    }

    /// An outgoing line (fulfilment): `quantity` leaves the depot.
    pub fn outgoing(materiel_id: MaterielId, quantity: i64) -> Self {
        Self::new(materiel_id, -quantity)
    }
}

/// Validate a batch before any lock is taken.
///
/// A batch is non-empty, names each material once, and every delta agrees in sign
/// with `reason`.
pub fn validate_batch(adjustments: &[StockAdjustment], reason: MovementReason) -> DomainResult<()> {
    if adjustments.is_empty() {
        return Err(DomainError::invalid_input("stock transaction has no lines"));
    }

    let mut seen = HashSet::with_capacity(adjustments.len());
    for (idx, adj) in adjustments.iter().enumerate() {
        if !seen.insert(adj.materiel_id) {
            return Err(DomainError::invalid_input(format!(
                "materiel {} appears more than once (line {})",
                adj.materiel_id,
                idx + 1
            )));
        }
        reason.check_delta(adj.delta)?;
    }

    Ok(())
}
