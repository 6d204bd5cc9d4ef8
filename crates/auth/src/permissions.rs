use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Permission identifier, `"<area>.<action>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const REQUESTS_CREATE: Permission = Permission::from_static("requests.create");
    pub const REQUESTS_VALIDATE: Permission = Permission::from_static("requests.validate");
    pub const REQUESTS_PROCESS: Permission = Permission::from_static("requests.process");
    pub const DELIVERY_DIRECT: Permission = Permission::from_static("delivery.direct");
    pub const DELIVERY_CANCEL: Permission = Permission::from_static("delivery.cancel");
    pub const STOCK_ADJUST: Permission = Permission::from_static("stock.adjust");
    pub const STOCK_CORRECT: Permission = Permission::from_static("stock.correct");
    pub const STOCK_READ: Permission = Permission::from_static("stock.read");
    pub const MATERIALS_CREATE: Permission = Permission::from_static("materials.create");

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

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

const CHEF_CHANTIER: &[Permission] = &[Permission::REQUESTS_CREATE];

const MAGAZINIER: &[Permission] = &[
    Permission::REQUESTS_VALIDATE,
    Permission::REQUESTS_PROCESS,
    Permission::DELIVERY_DIRECT,
    Permission::STOCK_ADJUST,
    Permission::STOCK_READ,
];

const DIRECTEUR: &[Permission] = &[
    Permission::REQUESTS_VALIDATE,
    Permission::DELIVERY_CANCEL,
    Permission::STOCK_ADJUST,
    Permission::STOCK_CORRECT,
    Permission::STOCK_READ,
    Permission::MATERIALS_CREATE,
];

/// Static role → permission policy.
pub fn permissions_for(role: &Role) -> &'static [Permission] {
    match role.as_str() {
        "chef_chantier" => CHEF_CHANTIER,
        "magazinier" => MAGAZINIER,
        "directeur" => DIRECTEUR,
        _ => &[],
    }
}
