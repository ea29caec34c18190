//! Connectivity probes.

use crate::remote::{ListFilter, RemoteStore};
use async_trait::async_trait;
use ledgersync_protocol::EntityKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Answers whether the remote store is currently reachable.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Returns true if the remote store answered.
    async fn is_online(&self) -> bool;
}

#[async_trait]
impl<P: ConnectivityProbe + ?Sized> ConnectivityProbe for Arc<P> {
    async fn is_online(&self) -> bool {
        (**self).is_online().await
    }
}

/// Probes by issuing a cheap read against the remote store.
///
/// Any error, including authentication failures, counts as offline.
#[derive(Debug)]
pub struct RemoteProbe<R> {
    remote: Arc<R>,
}

impl<R: RemoteStore> RemoteProbe<R> {
    /// Creates a probe over `remote`.
    pub fn new(remote: Arc<R>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl<R: RemoteStore> ConnectivityProbe for RemoteProbe<R> {
    async fn is_online(&self) -> bool {
        match self
            .remote
            .list(EntityKind::Client, &ListFilter::all().with_limit(1))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "connectivity probe failed");
                false
            }
        }
    }
}

/// A probe whose answer is set by the host, e.g. from OS network events.
#[derive(Debug)]
pub struct ManualProbe {
    online: AtomicBool,
}

impl ManualProbe {
    /// Creates a probe reporting `online`.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    /// Sets the reported state.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for ManualProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConnectivityProbe for ManualProbe {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
