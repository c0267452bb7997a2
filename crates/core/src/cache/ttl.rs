//! Small in-memory cache with TTL semantics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A value store where every entry carries an absolute expiry.
///
/// A read past expiry is equivalent to absence: the entry is dropped and
/// `None` is returned. The lock is only held for map operations, so the
/// cache is safe to share across tasks.
pub struct TtlCache<V> {
    default_ttl: Duration,
    store: Mutex<HashMap<String, (Instant, V)>>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache whose entries expire after `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            store: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a key, removing it if it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut store = self.store.lock().expect("ttl cache lock poisoned");
        match store.get(key) {
            Some((expiry, _)) if *expiry <= Instant::now() => {
                store.remove(key);
                None
            }
            Some((_, value)) => Some(value.clone()),
            None => None,
        }
    }

    /// Insert a value with the default TTL.
    pub fn set(&self, key: &str, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert a value with an explicit TTL.
    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        let mut store = self.store.lock().expect("ttl cache lock poisoned");
        store.insert(key.to_string(), (Instant::now() + ttl, value));
    }

    /// Remove a key, returning the value if it was present and fresh.
    pub fn remove(&self, key: &str) -> Option<V> {
        let mut store = self.store.lock().expect("ttl cache lock poisoned");
        store
            .remove(key)
            .filter(|(expiry, _)| *expiry > Instant::now())
            .map(|(_, value)| value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.store.lock().expect("ttl cache lock poisoned").clear();
    }

    /// Number of stored entries, including not-yet-collected expired ones.
    pub fn len(&self) -> usize {
        self.store.lock().expect("ttl cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
