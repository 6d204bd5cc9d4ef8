//! Stock domain rules (pure, deterministic).
//!
//! This crate holds the arithmetic and validation behind the stock ledger:
//! per-material balances, movement records and adjustment batches. Locking,
//! storage and sequencing live in `matflow-infra`.

pub mod adjustment;
pub mod material;
pub mod movement;

pub use adjustment::{StockAdjustment, validate_batch};
pub use material::MaterialStock;
pub use movement::{DateRange, MovementId, MovementReason, MovementRef, StockMovement};
