//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimised read models.
//! They are rebuildable from the event stream, depot-isolated, and idempotent
//! under at-least-once delivery (per-stream cursors).

pub mod requests;

pub use requests::{RequestFilter, RequestProjection, RequestProjectionError, RequestView};
