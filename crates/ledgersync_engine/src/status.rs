//! Sync status snapshots and their publication.

use crate::error::{PersistError, SyncError, SyncResult};
use chrono::{DateTime, Utc};
use ledgersync_storage::LocalCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// A point-in-time summary of the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Whether the last connectivity check succeeded.
    pub is_online: bool,
    /// Whether a pass is running.
    pub is_syncing: bool,
    /// End of the last pass that ran while online.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Operations pending or being applied.
    pub pending_count: usize,
    /// Operations out of retries.
    pub failed_count: usize,
    /// Most recent operation failure, verbatim.
    pub last_error: Option<String>,
}

type Listener = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl Registry {
    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }
}

/// Fans status snapshots out to registered listeners.
///
/// Listeners run synchronously in registration order on the publishing
/// task, outside any internal lock. A panicking listener is logged and
/// does not stop delivery to the others.
#[derive(Clone, Default)]
pub struct StatusPublisher {
    registry: Arc<Registry>,
}

impl StatusPublisher {
    /// Creates a publisher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.listeners.lock().len()
    }

    /// Delivers `status` to every listener.
    pub fn publish(&self, status: &SyncStatus) {
        let listeners: Vec<(u64, Listener)> = self.registry.listeners.lock().clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
                tracing::error!(listener = id, "status listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for StatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPublisher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by [`StatusPublisher::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.remove(self.id))
    }
}

/// The status fields that survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedStatus {
    /// End of the last successful pass.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl PersistedStatus {
    /// Loads the record stored under `key`; missing means never synced.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache read fails or the bytes cannot be decoded.
    pub fn load<C: LocalCache + ?Sized>(cache: &C, key: &str) -> SyncResult<Self> {
        match cache.get(key)? {
            Some(bytes) => ciborium::from_reader(bytes.as_slice())
                .map_err(|e| SyncError::Codec(format!("status under {key}: {e}"))),
            None => Ok(Self::default()),
        }
    }

    /// Stores the record under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the cache write fails.
    pub fn save<C: LocalCache + ?Sized>(&self, cache: &C, key: &str) -> Result<(), PersistError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| PersistError::Encode(e.to_string()))?;
        cache.set(key, &bytes)?;
        Ok(())
    }
}
