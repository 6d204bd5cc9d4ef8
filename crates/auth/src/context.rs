use serde::Serialize;

use matflow_core::{DepotId, UserId};

use crate::{JwtClaims, Permission, Role, permissions_for};

/// The authenticated caller: identity, roles and optional home depot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub depot_id: Option<DepotId>,
}

impl AuthContext {
    pub fn new(user_id: UserId, roles: Vec<Role>, depot_id: Option<DepotId>) -> Self {
        Self {
            user_id,
            roles,
            depot_id,
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// Union of the permissions of every role held, without duplicates.
    pub fn permissions(&self) -> Vec<Permission> {
        let mut out: Vec<Permission> = Vec::new();
        for perm in self.roles.iter().flat_map(permissions_for) {
            if !out.contains(perm) {
                out.push(perm.clone());
            }
        }
        out
    }

    pub fn has_permission(&self, required: &Permission) -> bool {
        self.roles.iter().any(|r| permissions_for(r).contains(required))
    }

    /// A depot-less caller reaches every depot; otherwise only its own.
    pub fn can_access_depot(&self, depot_id: DepotId) -> bool {
        self.depot_id.is_none_or(|own| own == depot_id)
    }
}

impl From<JwtClaims> for AuthContext {
    fn from(claims: JwtClaims) -> Self {
        Self::new(claims.sub, claims.roles, claims.depot_id)
    }
}
