use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

use matflow_auth::{AuthContext, Permission};
use matflow_delivery::{DeliveryNote, DeliveryNoteId};
use matflow_infra::fulfillment::DirectDistribution;

use crate::app::dto;
use crate::app::errors::{ApiError, parse_id};
use crate::app::routes::scopes;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{IdempotencyKey, JsonBody, QueryParams};

pub fn router() -> Router {
    Router::new()
        .route("/delivery-notes", get(list_notes))
        .route("/delivery-notes/direct", post(distribute_direct))
        .route("/delivery-notes/:id", get(get_note))
        .route("/delivery-notes/:id/cancel", post(cancel_note))
}

pub async fn list_notes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    QueryParams(query): QueryParams<dto::DeliveryNoteListQuery>,
) -> Result<Json<dto::DeliveryNoteListResponse>, ApiError> {
    let (mut filter, depot) = query.into_filter()?;
    filter.depot_id = authz::listing_depot(&ctx, depot)?;

    let items: Vec<dto::DeliveryNoteResponse> =
        services.deliveries.list(&filter).into_iter().map(Into::into).collect();
    Ok(Json(dto::DeliveryNoteListResponse {
        total: items.len(),
        items,
    }))
}

pub async fn get_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<dto::DeliveryNoteResponse>, ApiError> {
    let note = visible_note(&services, &ctx, &id)?;
    Ok(Json(note.into()))
}

pub async fn distribute_direct(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    key: IdempotencyKey,
    JsonBody(body): JsonBody<dto::DirectDistributionBody>,
) -> Result<(StatusCode, Json<dto::DeliveryNoteResponse>), ApiError> {
    authz::require_in_depot(&ctx, &Permission::DELIVERY_DIRECT, body.depot_id)?;

    let order = DirectDistribution {
        depot_id: body.depot_id,
        issuer: ctx.user_id,
        recipient: body.recipient,
        lines: body.lines.into_iter().map(Into::into).collect(),
        comment: body.comment,
    };
    let note = services.fulfillment.fulfill_direct(order, key.as_str())?;

    Ok((StatusCode::CREATED, Json(note.into())))
}

pub async fn cancel_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    key: IdempotencyKey,
    body: Option<JsonBody<dto::CancelNoteBody>>,
) -> Result<Json<dto::DeliveryNoteResponse>, ApiError> {
    let note = visible_note(&services, &ctx, &id)?;
    authz::require_in_depot(&ctx, &Permission::DELIVERY_CANCEL, note.depot_id())?;

    let comment = body.and_then(|JsonBody(b)| b.comment);
    let cancelled = services.idempotency.run(
        scopes::CANCEL_NOTE,
        note.depot_id(),
        key.as_str(),
        || {
            services
                .fulfillment
                .cancel_delivery_note(note.id_typed(), ctx.user_id, comment)
        },
        |n| n.numero().to_string(),
    )?;

    Ok(Json(cancelled.into()))
}

fn visible_note(services: &AppServices, ctx: &AuthContext, raw_id: &str) -> Result<DeliveryNote, ApiError> {
    let note_id = DeliveryNoteId::new(parse_id(raw_id)?);
    let note = services.deliveries.get(note_id)?;
    authz::ensure_visible(ctx, note.depot_id(), || format!("delivery note {note_id}"))?;
    Ok(note)
}
