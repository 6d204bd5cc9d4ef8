use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role carried in a token.
///
/// Kept as an opaque string so tokens minted with roles this service does not
/// know still decode; unknown roles simply grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Site manager: raises material requests.
    pub const CHEF_CHANTIER: Role = Role::from_static("chef_chantier");
    /// Warehouse keeper: validates, fulfils, distributes and adjusts stock.
    pub const MAGAZINIER: Role = Role::from_static("magazinier");
    /// Depot director: validates, corrects, cancels and manages the catalog.
    pub const DIRECTEUR: Role = Role::from_static("directeur");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
