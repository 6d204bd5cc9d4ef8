//! Shared vocabulary of the depot domain: ids, errors, document numbers and
//! the aggregate traits. No IO lives here.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, ErrorKind};
pub use id::{AggregateId, CategoryId, DepotId, MaterielId, UserId};
pub use value_object::{DocumentKind, DocumentNumber, ValueObject};
