//! Error types for cache operations.

use std::io;
use thiserror::Error;

/// Result type for cache operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key cannot be used as a cache entry name.
    #[error("invalid cache key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Another process holds the cache directory lock.
    #[error("cache directory is locked by another process: {0}")]
    Locked(String),

    /// The cache refused the write (used by fault-injecting caches).
    #[error("cache write rejected: {0}")]
    WriteRejected(String),
}
