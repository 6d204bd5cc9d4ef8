use axum::{Json, extract::Extension, http::StatusCode};
use serde_json::{Value as JsonValue, json};

use matflow_auth::AuthContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(ctx): Extension<AuthContext>) -> Json<JsonValue> {
    Json(json!({
        "user_id": ctx.user_id.to_string(),
        "depot_id": ctx.depot_id.map(|d| d.to_string()),
        "roles": ctx.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": ctx.permissions().iter().map(|p| p.as_str().to_string()).collect::<Vec<_>>(),
    }))
}
