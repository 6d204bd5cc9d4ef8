use axum::{Router, routing::get};

pub mod delivery_notes;
pub mod events;
pub mod materials;
pub mod requests;
pub mod stock;
pub mod system;

/// Idempotency scopes of the mutations not covered by the fulfilment processor.
pub(crate) mod scopes {
    pub const CREATE_REQUEST: &str = "requests.create";
    pub const VALIDATE_REQUEST: &str = "requests.validate";
    pub const CANCEL_NOTE: &str = "delivery.cancel";
    pub const MANUAL_STOCK: &str = "stock.manual";
    pub const REGISTER_MATERIAL: &str = "materials.register";
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(requests::router())
        .merge(delivery_notes::router())
        .merge(stock::router())
        .merge(materials::router())
        .merge(events::router())
}
