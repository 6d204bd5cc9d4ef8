use std::{convert::Infallible, sync::Arc};

use axum::{
    Router,
    extract::Extension,
    response::sse::{Event as SseEvent, Sse},
    routing::get,
};

use matflow_auth::AuthContext;

use crate::app::services::{self, AppServices};

pub fn router() -> Router {
    Router::new().route("/events/stream", get(stream))
}

/// Domain events as server-sent events, limited to the caller's depot if it has one.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    tracing::debug!(user_id = %ctx.user_id, "realtime subscriber connected");
    services::depot_sse_stream(&services, ctx.depot_id)
}
