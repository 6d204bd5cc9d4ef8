//! Permission checks at the HTTP boundary, before any service is called.

use matflow_auth::{AuthContext, Permission, authorize, authorize_in_depot};
use matflow_core::DepotId;

use crate::app::errors::ApiError;

pub fn require(ctx: &AuthContext, permission: &Permission) -> Result<(), ApiError> {
    authorize(ctx, permission).map_err(ApiError::from)
}

/// [`require`], restricted to a depot the caller may act in.
pub fn require_in_depot(ctx: &AuthContext, permission: &Permission, depot_id: DepotId) -> Result<(), ApiError> {
    authorize_in_depot(ctx, permission, depot_id).map_err(ApiError::from)
}

/// Reads of a foreign depot's documents look like misses.
pub fn ensure_visible(ctx: &AuthContext, depot_id: DepotId, what: impl FnOnce() -> String) -> Result<(), ApiError> {
    if ctx.can_access_depot(depot_id) {
        Ok(())
    } else {
        Err(ApiError::not_found(what()))
    }
}

/// Depot a listing is limited to: the caller's own when scoped, else the query's.
pub fn listing_depot(ctx: &AuthContext, requested: Option<DepotId>) -> Result<Option<DepotId>, ApiError> {
    match (ctx.depot_id, requested) {
        (Some(own), Some(asked)) if own != asked => {
            Err(matflow_auth::AuthzError::DepotMismatch(asked).into())
        }
        (Some(own), _) => Ok(Some(own)),
        (None, asked) => Ok(asked),
    }
}
