use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post, put},
};

use matflow_auth::{AuthContext, Permission};
use matflow_infra::{
    projections::RequestView,
    request_store::NewRequest,
    validation::Decision,
};
use matflow_requests::RequestId;

use crate::app::dto::{self, DecisionKind};
use crate::app::errors::{ApiError, parse_id};
use crate::app::routes::scopes;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{IdempotencyKey, JsonBody, QueryParams};

pub fn router() -> Router {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/validate", put(validate_request))
        .route("/requests/:id/process", post(process_request))
}

pub async fn create_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    key: IdempotencyKey,
    JsonBody(body): JsonBody<dto::CreateRequestBody>,
) -> Result<(StatusCode, Json<dto::RequestResponse>), ApiError> {
    authz::require_in_depot(&ctx, &Permission::REQUESTS_CREATE, body.depot_id)?;

    let new = NewRequest {
        depot_id: body.depot_id,
        requester: ctx.user_id,
        priority: body.priority,
        desired_date: body.desired_date,
        comment: body.comment,
        lines: body.lines.into_iter().map(Into::into).collect(),
    };
    let view = services.idempotency.run(
        scopes::CREATE_REQUEST,
        new.depot_id,
        key.as_str(),
        || services.requests.create(new),
        |v| v.numero.to_string(),
    )?;

    Ok((StatusCode::CREATED, Json(view.into())))
}

pub async fn list_requests(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    QueryParams(query): QueryParams<dto::RequestListQuery>,
) -> Result<Json<dto::RequestListResponse>, ApiError> {
    let (mut filter, depot) = query.into_filter()?;
    filter.depot_id = authz::listing_depot(&ctx, depot)?;

    Ok(Json(services.requests.list(&filter).into()))
}

pub async fn get_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<dto::RequestResponse>, ApiError> {
    let view = visible_request(&services, &ctx, &id)?;
    Ok(Json(view.into()))
}

pub async fn validate_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    key: IdempotencyKey,
    JsonBody(body): JsonBody<dto::ValidateRequestBody>,
) -> Result<Json<dto::ValidationResponse>, ApiError> {
    let current = visible_request(&services, &ctx, &id)?;
    authz::require_in_depot(&ctx, &Permission::REQUESTS_VALIDATE, current.depot_id)?;

    let decision = match body.decision {
        DecisionKind::Approve => Decision::Approve { grants: body.grants },
        DecisionKind::Reject => Decision::Reject,
    };
    let outcome = services.idempotency.run(
        scopes::VALIDATE_REQUEST,
        current.depot_id,
        key.as_str(),
        || services.validation.validate(current.id, ctx.user_id, decision, body.comment),
        |o| o.request.numero.to_string(),
    )?;

    Ok(Json(outcome.into()))
}

pub async fn process_request(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    key: IdempotencyKey,
) -> Result<(StatusCode, Json<dto::DeliveryNoteResponse>), ApiError> {
    let current = visible_request(&services, &ctx, &id)?;
    authz::require_in_depot(&ctx, &Permission::REQUESTS_PROCESS, current.depot_id)?;

    let note = services
        .fulfillment
        .fulfill_from_request(current.id, ctx.user_id, key.as_str())?;

    Ok((StatusCode::CREATED, Json(note.into())))
}

/// Look a request up by raw path id, hiding other depots' requests.
fn visible_request(services: &AppServices, ctx: &AuthContext, raw_id: &str) -> Result<RequestView, ApiError> {
    let request_id = RequestId::new(parse_id(raw_id)?);
    let view = services.requests.get(request_id)?;
    authz::ensure_visible(ctx, view.depot_id, || format!("request {request_id}"))?;
    Ok(view)
}
