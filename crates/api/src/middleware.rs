use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::Instrument;

use matflow_auth::{AuthContext, JwtValidator};

use crate::app::errors::ApiError;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Verify the bearer token and attach the caller's [`AuthContext`].
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        ApiError::from(e)
    })?;

    let ctx = AuthContext::from(claims);
    let span = tracing::info_span!("authenticated", user_id = %ctx.user_id);
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).instrument(span).await)
}

/// One log line per request with its outcome and latency.
pub async fn access_log(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let started = std::time::Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::error!(%method, %path, status, elapsed_ms, "request failed");
    } else {
        tracing::info!(%method, %path, status, elapsed_ms, "request served");
    }
    response
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?;

    let header = header
        .to_str()
        .map_err(|_| ApiError::unauthenticated("malformed authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthenticated("authorization scheme must be Bearer"))?
        .trim();

    if token.is_empty() {
        return Err(ApiError::unauthenticated("empty bearer token"));
    }

    Ok(token)
}
