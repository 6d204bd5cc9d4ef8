//! Router assembly. Handlers live under `routes/`, wire shapes in `dto`, and
//! every failure leaves through `errors::ApiError`.

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Router over freshly wired in-memory services.
pub fn build_app(config: &ApiConfig) -> Router {
    let services = Arc::new(services::build_services(config.events.channel_capacity));
    build_app_with(config, services)
}

pub fn build_app_with(config: &ApiConfig, services: Arc<services::AppServices>) -> Router {
    let auth = middleware::AuthState {
        jwt: Arc::new(matflow_auth::Hs256JwtValidator::new(config.jwt.secret.as_bytes())),
    };

    // Everything except /health needs a verified bearer token.
    let depot_api = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(auth, middleware::auth_middleware))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(depot_api)
        .layer(axum::middleware::from_fn(middleware::access_log))
}
