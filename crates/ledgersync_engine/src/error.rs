//! Error types for the sync engine.

use ledgersync_protocol::ProtocolError;
use ledgersync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can escape the sync engine.
///
/// Per-operation remote failures never appear here; they are recorded on
/// the operation and surfaced through the sync status.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local cache failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted queue or status bytes could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A remote call made on behalf of the caller failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// A remote record had an unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Failure to write queue or status state to the local cache.
///
/// Callers log and continue; in-memory state stays authoritative until
/// the next successful write.
#[derive(Error, Debug)]
pub enum PersistError {
    /// The cache rejected the write.
    #[error("cache write failed: {0}")]
    Storage(#[from] StorageError),

    /// The state could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Category of a remote store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network-level failure.
    Transport,
    /// The call did not complete in time.
    Timeout,
    /// The identity does not exist remotely.
    NotFound,
    /// The identity already exists remotely.
    AlreadyExists,
    /// The remote store refused the payload.
    Rejected,
}

/// An error returned by the remote store.
///
/// Displays as the remote message verbatim so it can be surfaced
/// unmodified as the operation's last error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    /// Failure category.
    pub kind: RemoteErrorKind,
    /// Message reported by the remote store.
    pub message: String,
}

impl RemoteError {
    /// Creates an error of the given kind.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    /// Creates an already-exists error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AlreadyExists, message)
    }

    /// Creates a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Rejected, message)
    }

    /// Returns true if retrying could plausibly succeed.
    ///
    /// Informational only: the processor retries every failure up to the
    /// operation's cap.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Transport | RemoteErrorKind::Timeout
        )
    }
}
