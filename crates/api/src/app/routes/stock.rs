use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
};

use matflow_auth::{AuthContext, Permission};
use matflow_core::DomainResult;
use matflow_infra::{catalog::CatalogLookup, ledger::ManualOp};
use matflow_stock::StockMovement;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::scopes;
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{IdempotencyKey, JsonBody, QueryParams};

pub fn router() -> Router {
    Router::new()
        .route("/stock/add", post(add_stock))
        .route("/stock/remove", post(remove_stock))
        .route("/stock/correction", post(correct_stock))
        .route("/stock/movements", get(list_movements))
        .route("/stock/low", get(low_stock))
}

#[derive(Debug, Clone, Copy)]
enum Manual {
    Add,
    Remove,
}

pub async fn add_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    key: IdempotencyKey,
    JsonBody(body): JsonBody<dto::ManualAdjustmentBody>,
) -> Result<(StatusCode, Json<StockMovement>), ApiError> {
    manual_adjustment(&services, &ctx, &key, body, Manual::Add)
}

pub async fn remove_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    key: IdempotencyKey,
    JsonBody(body): JsonBody<dto::ManualAdjustmentBody>,
) -> Result<(StatusCode, Json<StockMovement>), ApiError> {
    manual_adjustment(&services, &ctx, &key, body, Manual::Remove)
}

fn manual_adjustment(
    services: &AppServices,
    ctx: &AuthContext,
    key: &IdempotencyKey,
    body: dto::ManualAdjustmentBody,
    direction: Manual,
) -> Result<(StatusCode, Json<StockMovement>), ApiError> {
    let stock = services.ledger.material(body.materiel_id)?;
    authz::require_in_depot(ctx, &Permission::STOCK_ADJUST, stock.depot_id())?;

    let op = manual_op(ctx, key, body.comment);
    let movement = services.idempotency.run(
        scopes::MANUAL_STOCK,
        stock.depot_id(),
        key.as_str(),
        || -> DomainResult<StockMovement> {
            match direction {
                Manual::Add => services.ledger.manual_add(body.materiel_id, body.quantity, op),
                Manual::Remove => services.ledger.manual_remove(body.materiel_id, body.quantity, op),
            }
        },
        |m| format!("movement #{}", m.sequence),
    )?;

    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn correct_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    key: IdempotencyKey,
    JsonBody(body): JsonBody<dto::CorrectionBody>,
) -> Result<(StatusCode, Json<StockMovement>), ApiError> {
    let stock = services.ledger.material(body.materiel_id)?;
    authz::require_in_depot(&ctx, &Permission::STOCK_CORRECT, stock.depot_id())?;

    let op = manual_op(&ctx, &key, body.comment);
    let movement = services.idempotency.run(
        scopes::MANUAL_STOCK,
        stock.depot_id(),
        key.as_str(),
        || services.ledger.correct(body.materiel_id, body.delta, op),
        |m| format!("movement #{}", m.sequence),
    )?;

    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    QueryParams(query): QueryParams<dto::MovementsQuery>,
) -> Result<Json<Vec<StockMovement>>, ApiError> {
    let (materiel_id, range) = query.parse()?;
    let stock = services.ledger.material(materiel_id)?;
    authz::require_in_depot(&ctx, &Permission::STOCK_READ, stock.depot_id())?;

    let movements = services.ledger.movements_for(materiel_id, range)?.collect();
    Ok(Json(movements))
}

pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    QueryParams(query): QueryParams<dto::DepotQuery>,
) -> Result<Json<Vec<dto::MaterialResponse>>, ApiError> {
    let depot_id = authz::listing_depot(&ctx, query.depot_id()?)?
        .ok_or_else(|| ApiError::invalid_input("depot_id is required"))?;
    authz::require_in_depot(&ctx, &Permission::STOCK_READ, depot_id)?;

    let low = services
        .ledger
        .low_stock_materials(depot_id)
        .into_iter()
        .filter_map(|stock| {
            let info = services.catalog.material(stock.materiel_id())?;
            Some(dto::MaterialResponse::new(info, &stock))
        })
        .collect();
    Ok(Json(low))
}

fn manual_op(ctx: &AuthContext, key: &IdempotencyKey, comment: Option<String>) -> ManualOp {
    ManualOp {
        comment: comment.filter(|c| !c.trim().is_empty()),
        ..ManualOp::new(ctx.user_id).reference(key.as_str())
    }
}
