//! Directory-backed cache for persistent storage.
//!
//! Layout:
//!
//! ```text
//! <cache_dir>/
//! ├─ LOCK                  # Advisory lock for single-writer
//! ├─ ledgersync.queue      # One file per key
//! └─ ledgersync.status
//! ```

use crate::cache::{validate_key, LocalCache};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";

/// A cache that stores each key as a file inside one directory.
///
/// Values survive process restarts. Writes use the write-then-rename
/// pattern so a crash mid-write leaves the previous value intact.
///
/// # Thread Safety
///
/// The cache holds an exclusive advisory lock on its directory for its
/// whole lifetime; a second `FileCache` on the same directory fails with
/// [`StorageError::Locked`]. Writes within the process are serialized.
///
/// # Example
///
/// ```no_run
/// use ledgersync_storage::{FileCache, LocalCache};
/// use std::path::Path;
///
/// let cache = FileCache::open(Path::new("sync-cache")).unwrap();
/// cache.set("ledgersync.status", b"...").unwrap();
/// ```
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    write_lock: Mutex<()>,
    _lock_file: File,
}

impl FileCache {
    /// Opens or creates a cache directory and acquires its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `Locked`)
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        if !path.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::Other,
                format!("path is not a directory: {}", path.display()),
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
            _lock_file: lock_file,
        })
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        if key == LOCK_FILE {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "key is reserved",
            });
        }
        Ok(self.path.join(key))
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        // Keys never start with '.', so the temp name cannot collide with an entry.
        let temp_path = self.path.join(format!(".{key}.tmp"));

        let _guard = self.write_lock.lock();
        let mut file = File::create(&temp_path)?;
        file.write_all(value)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        self.sync_directory()?;
        tracing::trace!(key, bytes = value.len(), "cache entry written");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory(),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = FileCache::open(dir.path()).unwrap();
            cache.set("ledgersync.queue", b"queued").unwrap();
        }
        let cache = FileCache::open(dir.path()).unwrap();
        assert_eq!(
            cache.get("ledgersync.queue").unwrap(),
            Some(b"queued".to_vec())
        );
    }

    #[test]
    fn missing_key_is_none() {
        let dir = tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        assert_eq!(cache.get("absent").unwrap(), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        cache.set("k", b"v").unwrap();
        cache.remove("k").unwrap();
        cache.remove("k").unwrap();
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _first = FileCache::open(dir.path()).unwrap();
        let second = FileCache::open(dir.path());
        assert!(matches!(second, Err(StorageError::Locked(_))));
    }

    #[test]
    fn lock_file_key_is_reserved() {
        let dir = tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        assert!(cache.set("LOCK", b"x").is_err());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        cache.set("k", b"v").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
