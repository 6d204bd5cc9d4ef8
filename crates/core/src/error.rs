//! Domain error model.

use serde::Serialize;
use thiserror::Error;

use crate::id::MaterielId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business failure surfaced to the caller with a
/// stable [`ErrorKind`]. Infrastructure failures are wrapped one layer up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input, rejected before any state change.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A status change outside the request state machine.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The entity is not in the status the operation requires.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A granted quantity is outside `0..=requested`.
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    /// Stock check failed at commit time.
    #[error("insufficient stock for materiel {materiel}: requested {requested}, available {available}")]
    InsufficientStock {
        materiel: MaterielId,
        requested: i64,
        available: i64,
    },

    /// An idempotency key was replayed.
    #[error("already processed: {0}")]
    AlreadyProcessed(String),

    /// Unknown entity id.
    #[error("not found: {0}")]
    NotFound(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Optimistic concurrency failure (stale stream revision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

/// Stable, serialisable error kind exposed to API callers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidTransition,
    InvalidState,
    InvalidGrant,
    InsufficientStock,
    AlreadyProcessed,
    NotFound,
    InvalidId,
    Conflict,
    Unauthorized,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidGrant => "invalid_grant",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::AlreadyProcessed => "already_processed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidId => "invalid_id",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
        }
    }
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_grant(msg: impl Into<String>) -> Self {
        Self::InvalidGrant(msg.into())
    }

    pub fn insufficient_stock(materiel: MaterielId, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            materiel,
            requested,
            available,
        }
    }

    pub fn already_processed(msg: impl Into<String>) -> Self {
        Self::AlreadyProcessed(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidInput(_) => ErrorKind::InvalidInput,
            DomainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            DomainError::InvalidState(_) => ErrorKind::InvalidState,
            DomainError::InvalidGrant(_) => ErrorKind::InvalidGrant,
            DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            DomainError::AlreadyProcessed(_) => ErrorKind::AlreadyProcessed,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InvalidId(_) => ErrorKind::InvalidId,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Unauthorized => ErrorKind::Unauthorized,
        }
    }
}
