//! Material request domain module (event-sourced).
//!
//! A request (demande) is raised by a site manager, reviewed by depot staff and
//! finally fulfilled into a delivery note. This crate holds the state machine and
//! the grant rules as deterministic domain logic (no IO, no storage).

pub mod lines;
pub mod request;
pub mod status;

pub use lines::{GrantedLine, LineGrant, NewLine, RequestLine, resolve_grants, validate_new_lines};
pub use request::{
    ApproveRequest, CreateRequest, MarkDelivered, MaterialRequest, RejectRequest, RequestApproved,
    RequestCommand, RequestCreated, RequestDelivered, RequestEvent, RequestId, RequestRejected,
};
pub use status::{Priority, RequestStatus};
