//! In-memory cache for testing.

use crate::cache::{validate_key, LocalCache};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory cache.
///
/// This cache keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Hosts that do not need the queue to survive a restart
///
/// # Example
///
/// ```rust
/// use ledgersync_storage::{InMemoryCache, LocalCache};
///
/// let cache = InMemoryCache::new();
/// cache.set("k", b"v").unwrap();
/// cache.remove("k").unwrap();
/// assert_eq!(cache.get("k").unwrap(), None);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryCache {
    /// Creates a new empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-populated with entries.
    ///
    /// Useful for simulating a restart with previously persisted state.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    /// Returns the stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl LocalCache for InMemoryCache {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn missing_key_is_none() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("nothing").unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn set_replaces_value() {
        let cache = InMemoryCache::new();
        cache.set("k", b"first").unwrap();
        cache.set("k", b"second").unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"second".to_vec()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn with_entries_prepopulates() {
        let cache = InMemoryCache::with_entries([("b", vec![2]), ("a", vec![1])]);
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cache.get("a").unwrap(), Some(vec![1]));
    }

    #[test]
    fn invalid_key_is_rejected() {
        let cache = InMemoryCache::new();
        assert!(cache.set("../x", b"v").is_err());
    }

    proptest! {
        #[test]
        fn get_returns_last_set(values in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8)) {
            let cache = InMemoryCache::new();
            for value in &values {
                cache.set("key", value).unwrap();
            }
            prop_assert_eq!(cache.get("key").unwrap(), values.last().cloned());
        }
    }
}
