//! Infrastructure layer: stores, the stock ledger and the services that drive the
//! request → validation → fulfilment pipeline.
//!
//! Every store here is in-memory and sits behind the same boundaries a durable
//! backend would implement (`EventStore`, `DepotStore`, `CatalogLookup`).

pub mod catalog;
pub mod command_dispatcher;
pub mod delivery_store;
pub mod error;
pub mod event_store;
pub mod fulfillment;
pub mod idempotency;
pub mod ledger;
pub mod locks;
pub mod projections;
pub mod read_model;
pub mod request_store;
pub mod sequence;
pub mod validation;


pub use error::{ServiceError, ServiceResult};
