use serde::{Deserialize, Serialize};

use matflow_core::{DepotId, DomainError, DomainResult, Entity, MaterielId};

/// Stock-side state of one material: its balance and alert threshold.
///
/// Catalog attributes (name, unit, price) are not held here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialStock {
    materiel_id: MaterielId,
    depot_id: DepotId,
    stock_current: i64,
    stock_minimum: i64,
}

impl MaterialStock {
    /// Open a material at zero stock.
    pub fn open(materiel_id: MaterielId, depot_id: DepotId, stock_minimum: i64) -> DomainResult<Self> {
        check_minimum(stock_minimum)?;
        Ok(Self {
            materiel_id,
            depot_id,
            stock_current: 0,
            stock_minimum,
        })
    }

    pub fn materiel_id(&self) -> MaterielId {
        self.materiel_id
    }

    pub fn depot_id(&self) -> DepotId {
        self.depot_id
    }

    pub fn stock_current(&self) -> i64 {
        self.stock_current
    }

    pub fn stock_minimum(&self) -> i64 {
        self.stock_minimum
    }

    pub fn is_low(&self) -> bool {
        self.stock_current < self.stock_minimum
    }

    pub fn set_minimum(&mut self, stock_minimum: i64) -> DomainResult<()> {
        check_minimum(stock_minimum)?;
        self.stock_minimum = stock_minimum;
        Ok(())
    }

    /// Compute the balance `delta` would produce, without changing anything.
    pub fn check_adjustment(&self, delta: i64) -> DomainResult<i64> {
        if delta == 0 {
            return Err(DomainError::invalid_input("delta cannot be zero"));
        }

        let next = self
            .stock_current
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_input("stock quantity overflow"))?;

        if next < 0 {
            return Err(DomainError::insufficient_stock(
                self.materiel_id,
                delta.saturating_neg(),
                self.stock_current,
            ));
        }

        Ok(next)
    }

    /// Apply `delta` and return the new balance. State is untouched on error.
    pub fn apply(&mut self, delta: i64) -> DomainResult<i64> {
        let next = self.check_adjustment(delta)?;
        self.stock_current = next;
        Ok(next)
    }
}

impl Entity for MaterialStock {
    type Id = MaterielId;

    fn entity_id(&self) -> MaterielId {
        self.materiel_id
    }

    fn owning_depot(&self) -> DepotId {
        self.depot_id
    }
}

fn check_minimum(stock_minimum: i64) -> DomainResult<()> {
    if stock_minimum < 0 {
        return Err(DomainError::invalid_input("stock_minimum cannot be negative"));
    }
    Ok(())
}
