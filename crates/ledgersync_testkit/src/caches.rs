//! Caches for failure and restart scenarios.

use ledgersync_storage::{
    FileCache, InMemoryCache, LocalCache, StorageError, StorageResult,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

/// An in-memory cache whose writes can be made to fail.
///
/// Reads always succeed, so a test can observe that in-memory state kept
/// moving while persistence was broken.
#[derive(Debug, Default)]
pub struct FaultyCache {
    inner: InMemoryCache,
    fail_writes: AtomicBool,
    rejected_writes: AtomicUsize,
    write_log: Mutex<Vec<String>>,
}

impl FaultyCache {
    /// Creates a cache that accepts writes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of writes rejected so far.
    pub fn rejected_writes(&self) -> usize {
        self.rejected_writes.load(Ordering::SeqCst)
    }

    /// Keys of accepted writes, in order.
    pub fn write_log(&self) -> Vec<String> {
        self.write_log.lock().clone()
    }
}

impl LocalCache for FaultyCache {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.rejected_writes.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::WriteRejected(format!(
                "injected failure writing {key}"
            )));
        }
        self.inner.set(key, value)?;
        self.write_log.lock().push(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)
    }
}

/// A temporary cache directory, removed on drop.
///
/// Each [`open`](Self::open) returns a fresh [`FileCache`] over the same
/// directory. Dropping the previous cache releases its lock, so a test can
/// simulate a process restart by opening again.
#[derive(Debug)]
pub struct TempCacheDir {
    dir: TempDir,
}

impl TempCacheDir {
    /// Creates an empty temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Opens a file cache over the directory.
    pub fn open(&self) -> FileCache {
        FileCache::open(self.dir.path()).expect("Failed to open file cache")
    }
}

impl Default for TempCacheDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopen_sees_previous_writes() {
        let dir = TempCacheDir::new();
        {
            let cache = dir.open();
            cache.set("k", b"v").unwrap();
        }
        assert_eq!(dir.open().get("k").unwrap(), Some(b"v".to_vec()));
        assert!(dir.path().is_dir());
    }

    #[test]
    fn second_open_while_held_is_locked() {
        let dir = TempCacheDir::new();
        let _held = dir.open();
        assert!(matches!(
            FileCache::open(dir.path()),
            Err(StorageError::Locked(_))
        ));
    }
}
