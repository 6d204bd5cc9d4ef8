//! Depot-isolated read model storage abstractions.

pub mod depot_store;

pub use depot_store::{DepotStore, InMemoryDepotStore};
