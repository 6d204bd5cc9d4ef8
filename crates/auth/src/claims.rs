use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use matflow_core::{DepotId, UserId};

use crate::Role;

/// Claims matflow expects in a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: UserId,

    /// Depot the user works in. Absent for staff allowed across depots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depot_id: Option<DepotId>,

    pub roles: Vec<Role>,

    pub issued_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("bearer token expired")]
    Expired,

    #[error("bearer token issued in the future")]
    NotYetValid,

    #[error("bearer token expires before it was issued")]
    InvalidTimeWindow,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Accept `now` only inside `[issued_at, expires_at)`.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let JwtClaims { issued_at, expires_at, .. } = *claims;
    if expires_at <= issued_at {
        Err(TokenValidationError::InvalidTimeWindow)
    } else if now < issued_at {
        Err(TokenValidationError::NotYetValid)
    } else if now >= expires_at {
        Err(TokenValidationError::Expired)
    } else {
        Ok(())
    }
}
