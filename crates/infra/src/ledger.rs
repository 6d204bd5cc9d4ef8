//! The stock ledger: sole owner of `stock_current` and of the movement log.
//!
//! Every material has an account guarded by its own mutex. A mutation checks,
//! applies and appends under that mutex, so a material's balance always equals the
//! sum of its movement deltas. Multi-material transactions lock their accounts in
//! ascending `MaterielId` order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};

use matflow_core::{DepotId, DomainError, DomainResult, MaterielId, UserId};
use matflow_events::{DomainEvent, EventSink};
use matflow_stock::{
    DateRange, MaterialStock, MovementId, MovementReason, MovementRef, StockAdjustment,
    StockMovement, validate_batch,
};

/// Attribution shared by every movement of one ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementEntry {
    pub reason: MovementReason,
    pub actor: UserId,
    pub related: Option<MovementRef>,
    pub comment: Option<String>,
}

impl MovementEntry {
    pub fn new(reason: MovementReason, actor: UserId) -> Self {
        Self {
            reason,
            actor,
            related: None,
            comment: None,
        }
    }

    pub fn related(mut self, related: MovementRef) -> Self {
        self.related = Some(related);
        self
    }

    pub fn comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.trim().is_empty());
        self
    }
}

/// Caller details for the manual wrappers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualOp {
    pub actor: UserId,
    pub comment: Option<String>,
    /// Operation key the movement is attributed to (e.g. the idempotency key).
    pub reference: Option<String>,
}

impl ManualOp {
    pub fn new(actor: UserId) -> Self {
        Self {
            actor,
            comment: None,
            reference: None,
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    fn into_entry(self, reason: MovementReason) -> MovementEntry {
        let mut entry = MovementEntry::new(reason, self.actor).comment(self.comment);
        if let Some(r) = self.reference {
            entry = entry.related(MovementRef::Manual(r));
        }
        entry
    }
}

#[derive(Debug)]
struct AccountState {
    stock: MaterialStock,
    movements: Vec<StockMovement>,
}

#[derive(Debug)]
struct MaterialAccount {
    depot_id: DepotId,
    state: Mutex<AccountState>,
    /// Last committed balance, readable without the mutex.
    level: AtomicI64,
}

/// In-process stock ledger.
pub struct StockLedger {
    accounts: RwLock<HashMap<MaterielId, Arc<MaterialAccount>>>,
    sequence: AtomicU64,
    sink: Arc<dyn EventSink>,
}

impl core::fmt::Debug for StockLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockLedger")
            .field("accounts", &self.accounts.read().len())
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}

impl StockLedger {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            sink,
        }
    }

    /// Open a zero-stock account for a material.
    pub fn open_material(
        &self,
        materiel_id: MaterielId,
        depot_id: DepotId,
        stock_minimum: i64,
    ) -> DomainResult<MaterialStock> {
        let stock = MaterialStock::open(materiel_id, depot_id, stock_minimum)?;

        let mut accounts = self.accounts.write();
        if accounts.contains_key(&materiel_id) {
            return Err(DomainError::conflict(format!(
                "materiel {materiel_id} already has a stock account"
            )));
        }
        accounts.insert(
            materiel_id,
            Arc::new(MaterialAccount {
                depot_id,
                state: Mutex::new(AccountState {
                    stock: stock.clone(),
                    movements: Vec::new(),
                }),
                level: AtomicI64::new(0),
            }),
        );

        tracing::info!(%materiel_id, %depot_id, stock_minimum, "stock account opened");
        Ok(stock)
    }

    fn account(&self, materiel_id: MaterielId) -> DomainResult<Arc<MaterialAccount>> {
        self.accounts
            .read()
            .get(&materiel_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("materiel {materiel_id}")))
    }

    pub fn set_minimum(&self, materiel_id: MaterielId, stock_minimum: i64) -> DomainResult<MaterialStock> {
        let account = self.account(materiel_id)?;
        let mut state = account.state.lock();
        state.stock.set_minimum(stock_minimum)?;
        Ok(state.stock.clone())
    }

    /// Consistent snapshot of a material's stock.
    pub fn material(&self, materiel_id: MaterielId) -> DomainResult<MaterialStock> {
        let account = self.account(materiel_id)?;
        let state = account.state.lock();
        Ok(state.stock.clone())
    }

    /// Lock-free read of the last committed balance. Advisory only.
    pub fn stock_level(&self, materiel_id: MaterielId) -> DomainResult<i64> {
        Ok(self.account(materiel_id)?.level.load(Ordering::Acquire))
    }

    /// Apply one signed delta. Returns the recorded movement; its `balance_after`
    /// is the post-adjustment quantity.
    pub fn adjust(
        &self,
        materiel_id: MaterielId,
        delta: i64,
        entry: MovementEntry,
    ) -> DomainResult<StockMovement> {
        entry.reason.check_delta(delta)?;
        let account = self.account(materiel_id)?;

        let (movement, alert) = {
            let mut state = account.state.lock();
            self.commit_line(&account, &mut state, delta, &entry, Utc::now())?
        };

        tracing::info!(
            %materiel_id,
            delta,
            balance = movement.balance_after,
            reason = %entry.reason,
            "stock adjusted"
        );
        if let Some(event) = alert {
            self.sink.emit(event);
        }
        Ok(movement)
    }

    pub fn manual_add(&self, materiel_id: MaterielId, quantity: i64, op: ManualOp) -> DomainResult<StockMovement> {
        check_quantity(quantity)?;
        self.adjust(materiel_id, quantity, op.into_entry(MovementReason::ManualAdd))
    }

    pub fn manual_remove(&self, materiel_id: MaterielId, quantity: i64, op: ManualOp) -> DomainResult<StockMovement> {
        check_quantity(quantity)?;
        self.adjust(materiel_id, -quantity, op.into_entry(MovementReason::ManualRemove))
    }

    /// Signed correction (inventory count, cancellation).
    pub fn correct(&self, materiel_id: MaterielId, delta: i64, op: ManualOp) -> DomainResult<StockMovement> {
        self.adjust(materiel_id, delta, op.into_entry(MovementReason::Correction))
    }

    /// All-or-nothing multi-material transaction.
    ///
    /// Locks every account in ascending id order, checks every line, then runs
    /// `before_commit` with the locks still held. Only when it succeeds are the
    /// deltas applied and the movements appended, in the caller's line order. Any
    /// failure leaves every balance and log untouched.
    pub fn transact<T, E>(
        &self,
        adjustments: &[StockAdjustment],
        entry: MovementEntry,
        before_commit: impl FnOnce() -> Result<T, E>,
    ) -> Result<(T, Vec<StockMovement>), E>
    where
        E: From<DomainError>,
    {
        validate_batch(adjustments, entry.reason)?;

        let accounts = adjustments
            .iter()
            .map(|adj| self.account(adj.materiel_id))
            .collect::<DomainResult<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..adjustments.len()).collect();
        order.sort_by_key(|&idx| adjustments[idx].materiel_id);

        let mut locked: Vec<(usize, MutexGuard<'_, AccountState>)> = order
            .into_iter()
            .map(|idx| (idx, accounts[idx].state.lock()))
            .collect();
        locked.sort_by_key(|(idx, _)| *idx);
        let mut guards: Vec<MutexGuard<'_, AccountState>> =
            locked.into_iter().map(|(_, guard)| guard).collect();

        for (adj, guard) in adjustments.iter().zip(&guards) {
            guard.stock.check_adjustment(adj.delta)?;
        }

        let out = before_commit()?;

        let now = Utc::now();
        let mut movements = Vec::with_capacity(adjustments.len());
        let mut alerts = Vec::new();
        for ((adj, account), guard) in adjustments.iter().zip(&accounts).zip(guards.iter_mut()) {
            let (movement, alert) = self.commit_line(account, guard, adj.delta, &entry, now)?;
            movements.push(movement);
            alerts.extend(alert);
        }
        drop(guards);

        tracing::info!(
            lines = movements.len(),
            reason = %entry.reason,
            related = ?entry.related,
            "stock transaction committed"
        );
        for event in alerts {
            self.sink.emit(event);
        }
        Ok((out, movements))
    }

    /// Apply one already-checked delta with the account lock held.
    fn commit_line(
        &self,
        account: &MaterialAccount,
        state: &mut AccountState,
        delta: i64,
        entry: &MovementEntry,
        now: DateTime<Utc>,
    ) -> DomainResult<(StockMovement, Option<DomainEvent>)> {
        let was_low = state.stock.is_low();
        let balance_after = state.stock.apply(delta)?;
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;

        let movement = StockMovement {
            id: MovementId::new(),
            sequence,
            materiel_id: state.stock.materiel_id(),
            depot_id: account.depot_id,
            delta,
            reason: entry.reason,
            actor: entry.actor,
            related: entry.related.clone(),
            balance_after,
            comment: entry.comment.clone(),
            occurred_at: now,
        };
        state.movements.push(movement.clone());
        account.level.store(balance_after, Ordering::Release);

        let alert = (!was_low && state.stock.is_low()).then(|| DomainEvent::LowStock {
            depot_id: account.depot_id,
            materiel_id: state.stock.materiel_id(),
            stock_current: balance_after,
            stock_minimum: state.stock.stock_minimum(),
            occurred_at: now,
        });
        Ok((movement, alert))
    }

    /// Movements of a material within `range`, oldest first.
    ///
    /// Iterates a snapshot taken at call time; call again to restart.
    pub fn movements_for(
        &self,
        materiel_id: MaterielId,
        range: DateRange,
    ) -> DomainResult<impl Iterator<Item = StockMovement> + Send + 'static> {
        let account = self.account(materiel_id)?;
        let snapshot = account.state.lock().movements.clone();
        Ok(snapshot.into_iter().filter(move |m| range.contains(m.occurred_at)))
    }

    /// Materials of a depot whose stock is below their minimum.
    pub fn low_stock_materials(&self, depot_id: DepotId) -> Vec<MaterialStock> {
        let accounts: Vec<_> = self
            .accounts
            .read()
            .values()
            .filter(|a| a.depot_id == depot_id)
            .cloned()
            .collect();

        let mut low: Vec<MaterialStock> = accounts
            .iter()
            .map(|a| a.state.lock().stock.clone())
            .filter(MaterialStock::is_low)
            .collect();
        low.sort_by_key(MaterialStock::materiel_id);
        low
    }
}

fn check_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::invalid_input("quantity must be > 0"));
    }
    Ok(())
}
