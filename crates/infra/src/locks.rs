//! Keyed mutual exclusion.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

/// One lazily created mutex per key.
///
/// Entries live only while a handle is out: each `get` drops the entries nobody
/// else holds. Handles are only handed out under the map lock, so a pruned key
/// can never have a second live mutex. Callers hold the returned handle's lock for the duration of a critical section:
///
/// ```ignore
/// let lock = locks.get(request_id);
/// let _guard = lock.lock();
/// ```
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: K) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key).or_default().clone()
    }

    /// Number of keys with a live handle, as of the last `get`.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
