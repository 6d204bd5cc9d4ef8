//! Service-level error: a business failure or a storage failure.

use thiserror::Error;

use matflow_core::{DomainError, ErrorKind};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage unavailable or corrupted. Safe to retry under the idempotency contract.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl ServiceError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Domain kind, or `None` for storage failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Domain(e) => Some(e.kind()),
            ServiceError::Storage(_) => None,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Storage(_) => None,
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => ServiceError::Domain(e),
            DispatchError::Concurrency(msg) => ServiceError::Domain(DomainError::conflict(msg)),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        DispatchError::from(value).into()
    }
}
