use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use matflow_core::DepotId;

/// Depot-isolated key/value store for disposable read models.
pub trait DepotStore<K, V>: Send + Sync {
    fn get(&self, depot_id: DepotId, key: &K) -> Option<V>;
    fn upsert(&self, depot_id: DepotId, key: K, value: V);
    fn list(&self, depot_id: DepotId) -> Vec<V>;
    fn list_all(&self) -> Vec<V>;
    /// Drop every record of a depot (rebuild support).
    fn clear_depot(&self, depot_id: DepotId);
}

impl<K, V, S> DepotStore<K, V> for Arc<S>
where
    S: DepotStore<K, V> + ?Sized,
{
    fn get(&self, depot_id: DepotId, key: &K) -> Option<V> {
        (**self).get(depot_id, key)
    }

    fn upsert(&self, depot_id: DepotId, key: K, value: V) {
        (**self).upsert(depot_id, key, value)
    }

    fn list(&self, depot_id: DepotId) -> Vec<V> {
        (**self).list(depot_id)
    }

    fn list_all(&self) -> Vec<V> {
        (**self).list_all()
    }

    fn clear_depot(&self, depot_id: DepotId) {
        (**self).clear_depot(depot_id)
    }
}

/// In-memory depot-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryDepotStore<K, V> {
    inner: RwLock<HashMap<(DepotId, K), V>>,
}

impl<K, V> InMemoryDepotStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryDepotStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> DepotStore<K, V> for InMemoryDepotStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, depot_id: DepotId, key: &K) -> Option<V> {
        self.inner.read().get(&(depot_id, key.clone())).cloned()
    }

    fn upsert(&self, depot_id: DepotId, key: K, value: V) {
        self.inner.write().insert((depot_id, key), value);
    }

    fn list(&self, depot_id: DepotId) -> Vec<V> {
        self.inner
            .read()
            .iter()
            .filter_map(|((d, _k), v)| if *d == depot_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn list_all(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }

    fn clear_depot(&self, depot_id: DepotId) {
        self.inner.write().retain(|(d, _k), _v| *d != depot_id);
    }
}
