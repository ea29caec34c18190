//! Local cache trait definition.

use crate::error::{StorageError, StorageResult};

/// A local persistent key-value cache.
///
/// Caches are **opaque byte stores** keyed by short names. ledgersync owns
/// all value interpretation; caches do not understand queues or records.
///
/// # Invariants
///
/// - `get` returns exactly the bytes most recently passed to `set` for that key
/// - `set` replaces the whole value; there are no partial writes
/// - `remove` on a missing key is not an error
/// - Caches must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryCache`] - For testing
/// - [`super::FileCache`] - For persistent storage
pub trait LocalCache: Send + Sync {
    /// Reads the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// After this returns successfully the value survives process
    /// termination (for persistent implementations).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

impl<C: LocalCache + ?Sized> LocalCache for std::sync::Arc<C> {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

/// Checks that `key` can be used as a cache entry name.
///
/// Keys are limited to ASCII alphanumerics, `.`, `_` and `-` so that every
/// implementation can map them to file names without escaping.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] describing the first violation.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let reject = |reason| {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.is_empty() {
        return reject("key must not be empty");
    }
    if key.len() > 128 {
        return reject("key must be at most 128 bytes");
    }
    if key.starts_with('.') {
        return reject("key must not start with '.'");
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return reject("key may only contain [A-Za-z0-9._-]");
    }
    Ok(())
}
