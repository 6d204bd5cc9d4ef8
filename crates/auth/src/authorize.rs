use thiserror::Error;

use matflow_core::DepotId;

use crate::{AuthContext, Permission};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: no access to depot {0}")]
    DepotMismatch(DepotId),
}

/// Require `required` from any of the caller's roles.
pub fn authorize(ctx: &AuthContext, required: &Permission) -> Result<(), AuthzError> {
    if ctx.has_permission(required) {
        return Ok(());
    }
    tracing::warn!(user_id = %ctx.user_id, permission = %required, "permission denied");
    Err(AuthzError::Forbidden(required.as_str().to_string()))
}

/// [`authorize`], then require the caller to be allowed into `depot_id`.
pub fn authorize_in_depot(ctx: &AuthContext, required: &Permission, depot_id: DepotId) -> Result<(), AuthzError> {
    authorize(ctx, required)?;
    if !ctx.can_access_depot(depot_id) {
        tracing::warn!(user_id = %ctx.user_id, %depot_id, "depot access denied");
        return Err(AuthzError::DepotMismatch(depot_id));
    }
    Ok(())
}
