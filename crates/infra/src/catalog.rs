//! Catalog collaborator: which depots and materials exist, and what they cost.
//!
//! Catalog CRUD lives outside this system. The core only resolves references
//! through [`CatalogLookup`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use matflow_core::{CategoryId, DepotId, DomainError, DomainResult, MaterielId};

/// Catalog attributes of a material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialInfo {
    pub id: MaterielId,
    pub depot_id: DepotId,
    pub name: String,
    pub unit: String,
    /// Price in smallest currency unit.
    pub unit_price: u64,
    pub category_id: Option<CategoryId>,
}

pub trait CatalogLookup: Send + Sync {
    fn depot_exists(&self, depot_id: DepotId) -> bool;

    fn material(&self, materiel_id: MaterielId) -> Option<MaterialInfo>;

    /// Resolve every materiel and check it belongs to `depot_id`.
    ///
    /// Any unknown depot, unknown materiel or foreign materiel is `InvalidInput`.
    fn resolve_lines(
        &self,
        depot_id: DepotId,
        materiels: &[MaterielId],
    ) -> DomainResult<Vec<MaterialInfo>> {
        if !self.depot_exists(depot_id) {
            return Err(DomainError::invalid_input(format!("unknown depot {depot_id}")));
        }
        materiels
            .iter()
            .map(|id| {
                let info = self
                    .material(*id)
                    .ok_or_else(|| DomainError::invalid_input(format!("unknown materiel {id}")))?;
                if info.depot_id != depot_id {
                    return Err(DomainError::invalid_input(format!(
                        "materiel {id} does not belong to depot {depot_id}"
                    )));
                }
                Ok(info)
            })
            .collect()
    }
}

impl<C> CatalogLookup for Arc<C>
where
    C: CatalogLookup + ?Sized,
{
    fn depot_exists(&self, depot_id: DepotId) -> bool {
        (**self).depot_exists(depot_id)
    }

    fn material(&self, materiel_id: MaterielId) -> Option<MaterialInfo> {
        (**self).material(materiel_id)
    }
}

/// In-memory catalog for tests/dev and for seeding through the API.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    depots: RwLock<HashSet<DepotId>>,
    materials: RwLock<HashMap<MaterielId, MaterialInfo>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_depot(&self, depot_id: DepotId) {
        self.depots.write().insert(depot_id);
    }

    /// Register a material. Its depot is registered implicitly.
    pub fn register_material(&self, info: MaterialInfo) -> DomainResult<()> {
        if info.name.trim().is_empty() {
            return Err(DomainError::invalid_input("material name cannot be empty"));
        }
        if info.unit.trim().is_empty() {
            return Err(DomainError::invalid_input("material unit cannot be empty"));
        }

        let mut materials = self.materials.write();
        if materials.contains_key(&info.id) {
            return Err(DomainError::conflict(format!("materiel {} already registered", info.id)));
        }
        self.depots.write().insert(info.depot_id);
        materials.insert(info.id, info);
        Ok(())
    }

    pub fn materials_of(&self, depot_id: DepotId) -> Vec<MaterialInfo> {
        let mut out: Vec<_> = self
            .materials
            .read()
            .values()
            .filter(|m| m.depot_id == depot_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl CatalogLookup for InMemoryCatalog {
    fn depot_exists(&self, depot_id: DepotId) -> bool {
        self.depots.read().contains(&depot_id)
    }

    fn material(&self, materiel_id: MaterielId) -> Option<MaterialInfo> {
        self.materials.read().get(&materiel_id).cloned()
    }
}
