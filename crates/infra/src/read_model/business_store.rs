use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use procureflow_core::BusinessId;

/// Business-isolated key/value store for disposable read models.
///
/// Every read takes the business it is asked on behalf of; there is no way to
/// list another business's rows through this trait.
pub trait BusinessStore<K, V>: Send + Sync {
    fn get(&self, business_id: BusinessId, key: &K) -> Option<V>;
    fn upsert(&self, business_id: BusinessId, key: K, value: V);
    fn list(&self, business_id: BusinessId) -> Vec<V>;
    /// Drop all rows for a business (rebuild support).
    fn clear_business(&self, business_id: BusinessId);
}

impl<K, V, S> BusinessStore<K, V> for Arc<S>
where
    S: BusinessStore<K, V> + ?Sized,
{
    fn get(&self, business_id: BusinessId, key: &K) -> Option<V> {
        (**self).get(business_id, key)
    }

    fn upsert(&self, business_id: BusinessId, key: K, value: V) {
        (**self).upsert(business_id, key, value)
    }

    fn list(&self, business_id: BusinessId) -> Vec<V> {
        (**self).list(business_id)
    }

    fn clear_business(&self, business_id: BusinessId) {
        (**self).clear_business(business_id)
    }
}

#[derive(Debug)]
pub struct InMemoryBusinessStore<K, V> {
    inner: RwLock<HashMap<(BusinessId, K), V>>,
}

impl<K, V> InMemoryBusinessStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryBusinessStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> BusinessStore<K, V> for InMemoryBusinessStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, business_id: BusinessId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(business_id, key.clone())).cloned()
    }

    fn upsert(&self, business_id: BusinessId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((business_id, key), value);
        }
    }

    fn list(&self, business_id: BusinessId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((b, _k), v)| (*b == business_id).then(|| v.clone()))
            .collect()
    }

    fn clear_business(&self, business_id: BusinessId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(b, _k), _v| *b != business_id);
        }
    }
}
