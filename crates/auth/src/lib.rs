//! Who is calling and what they may do.
//!
//! Token issuance and user management live elsewhere; this crate only verifies
//! bearer tokens and answers permission questions. It knows nothing about HTTP.

pub mod authorize;
pub mod claims;
pub mod context;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, authorize, authorize_in_depot};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use context::AuthContext;
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::{Permission, permissions_for};
pub use roles::Role;
