use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    routing::post,
};

use matflow_auth::{AuthContext, Permission};
use matflow_infra::ledger::ManualOp;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::scopes;
use crate::app::services::{AppServices, MaterialRegistration};
use crate::authz;
use crate::context::{IdempotencyKey, JsonBody, QueryParams};

pub fn router() -> Router {
    Router::new().route("/materials", post(register_material).get(list_materials))
}

pub async fn register_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    key: IdempotencyKey,
    JsonBody(body): JsonBody<dto::RegisterMaterialBody>,
) -> Result<(StatusCode, Json<dto::MaterialResponse>), ApiError> {
    authz::require_in_depot(&ctx, &Permission::MATERIALS_CREATE, body.depot_id)?;

    let registration = MaterialRegistration {
        depot_id: body.depot_id,
        name: body.name,
        unit: body.unit,
        unit_price: body.unit_price,
        category_id: body.category_id,
        stock_minimum: body.stock_minimum,
        initial_stock: body.initial_stock,
    };
    let op = ManualOp::new(ctx.user_id)
        .reference(key.as_str())
        .comment("opening stock");
    let (info, stock) = services.idempotency.run(
        scopes::REGISTER_MATERIAL,
        registration.depot_id,
        key.as_str(),
        || services.register_material(registration, op),
        |(info, _)| info.id.to_string(),
    )?;

    Ok((StatusCode::CREATED, Json(dto::MaterialResponse::new(info, &stock))))
}

pub async fn list_materials(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    QueryParams(query): QueryParams<dto::DepotQuery>,
) -> Result<Json<Vec<dto::MaterialResponse>>, ApiError> {
    let depot_id = authz::listing_depot(&ctx, query.depot_id()?)?
        .ok_or_else(|| ApiError::invalid_input("depot_id is required"))?;

    let items = services
        .catalog
        .materials_of(depot_id)
        .into_iter()
        .filter_map(|info| {
            let stock = services.ledger.material(info.id).ok()?;
            Some(dto::MaterialResponse::new(info, &stock))
        })
        .collect();
    Ok(Json(items))
}
