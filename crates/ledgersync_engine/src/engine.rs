//! The sync engine facade.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::probe::ConnectivityProbe;
use crate::processor::{PassReport, SyncProcessor, Transition};
use crate::queue::QueueCounts;
use crate::remote::{ListFilter, RemoteStore};
use crate::status::{Subscription, SyncStatus};
use ledgersync_protocol::{
    detect, BatchResolution, ConflictRecord, ConflictResolver, EntityRecord, Operation,
    OperationId, ProtocolError, QueuedOperation, Record,
};
use ledgersync_storage::LocalCache;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Conflicts found between a local snapshot and the remote store, with
/// their resolutions.
#[derive(Debug, Clone)]
pub struct Reconciliation<T> {
    /// Detected conflicts.
    pub conflicts: Vec<ConflictRecord<T>>,
    /// Resolution of each conflict.
    pub resolution: BatchResolution<T>,
}

/// The offline-first sync engine.
///
/// Owns the operation queue and drives the sync processor. Cloning is
/// cheap and every clone shares the same queue.
///
/// # Example
///
/// ```rust,ignore
/// let engine = SyncEngine::open(SyncConfig::default(), cache, remote, probe)?;
/// let _sub = engine.subscribe(|status| println!("pending: {}", status.pending_count));
/// engine.enqueue(Operation::create(session));
/// let background = engine.spawn_background();
/// ```
pub struct SyncEngine<C, R, P> {
    processor: Arc<SyncProcessor<C, R, P>>,
}

impl<C, R, P> Clone for SyncEngine<C, R, P> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
        }
    }
}

impl<C, R, P> SyncEngine<C, R, P>
where
    C: LocalCache + 'static,
    R: RemoteStore + 'static,
    P: ConnectivityProbe + 'static,
{
    /// Opens the engine, loading persisted queue and status from `cache`.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read or decoded.
    pub fn open(config: SyncConfig, cache: C, remote: R, probe: P) -> SyncResult<Self> {
        let processor =
            SyncProcessor::new(config, Arc::new(cache), Arc::new(remote), Arc::new(probe))?;
        let engine = Self {
            processor: Arc::new(processor),
        };
        tracing::info!(
            operations = engine.processor.queue().len(),
            "sync engine opened"
        );
        Ok(engine)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        self.processor.config()
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &Arc<R> {
        self.processor.remote()
    }

    /// Queues an operation and returns its id.
    ///
    /// Never blocks on delivery. When called inside a Tokio runtime, a pass
    /// is started in the background; it does nothing if offline.
    pub fn enqueue(&self, operation: Operation) -> OperationId {
        let id = self.processor.queue().enqueue(operation);
        self.after_enqueue();
        id
    }

    /// Queues an operation together with the local record it replaces.
    pub fn enqueue_with_reference(
        &self,
        operation: Operation,
        local_reference: impl Into<EntityRecord>,
    ) -> OperationId {
        let id = self
            .processor
            .queue()
            .enqueue_with_reference(operation, local_reference.into());
        self.after_enqueue();
        id
    }

    fn after_enqueue(&self) {
        self.processor.publish();
        if !self.processor.config().sync_on_enqueue {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let processor = Arc::clone(&self.processor);
                handle.spawn(async move {
                    processor.process_queue().await;
                });
            }
            Err(_) => tracing::debug!("no runtime; operation waits for the next pass"),
        }
    }

    /// Runs a pass now and waits for it.
    pub async fn force_sync(&self) -> PassReport {
        self.processor.process_queue().await
    }

    /// Resets failed operations and runs a pass if online.
    ///
    /// Returns the number of operations reset.
    pub async fn retry_failed_operations(&self) -> usize {
        self.processor.retry_failed().await
    }

    /// Removes every operation. Returns the number removed.
    pub fn clear_queue(&self) -> usize {
        let removed = self.processor.queue().clear();
        self.processor.publish();
        removed
    }

    /// Removes operations whose target identity is malformed and returns them.
    pub fn inspect_and_repair_queue(&self) -> Vec<QueuedOperation> {
        let removed = self.processor.queue().repair();
        if !removed.is_empty() {
            self.processor.publish();
        }
        removed
    }

    /// Removes one operation regardless of state.
    pub fn remove(&self, id: OperationId) -> Option<QueuedOperation> {
        let removed = self.processor.queue().remove(id);
        if removed.is_some() {
            self.processor.publish();
        }
        removed
    }

    /// Returns a copy of one operation.
    pub fn get(&self, id: OperationId) -> Option<QueuedOperation> {
        self.processor.queue().get(id)
    }

    /// Returns a copy of the queue.
    pub fn operations(&self) -> Vec<QueuedOperation> {
        self.processor.queue().all()
    }

    /// Counts operations by state.
    pub fn counts(&self) -> QueueCounts {
        self.processor.queue().counts()
    }

    /// Registers a status listener.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        self.processor.publisher().subscribe(listener)
    }

    /// Returns the current status.
    pub fn current_status(&self) -> SyncStatus {
        self.processor.status()
    }

    /// Reports a connectivity change from the host.
    ///
    /// Going online runs a pass and returns its report.
    pub async fn connectivity_changed(&self, online: bool) -> Option<PassReport> {
        match self.processor.set_online(online) {
            Transition::Reconnected => Some(self.processor.process_queue().await),
            Transition::Disconnected | Transition::Unchanged => None,
        }
    }

    /// Compares a local snapshot against the remote collection of the same
    /// kind and resolves every conflict.
    ///
    /// The queue is not touched; applying the resolutions is up to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails or the remote returns a record of
    /// another kind.
    pub async fn reconcile<T>(
        &self,
        local: &[T],
        resolver: &ConflictResolver,
    ) -> SyncResult<Reconciliation<T>>
    where
        T: Record + TryFrom<EntityRecord, Error = ProtocolError>,
    {
        let remote = self
            .processor
            .remote()
            .list(T::KIND, &ListFilter::all())
            .await?
            .into_iter()
            .map(T::try_from)
            .collect::<Result<Vec<T>, _>>()
            .map_err(SyncError::from)?;

        let conflicts = detect(local, &remote);
        let resolution = resolver.resolve_batch(&conflicts);
        tracing::info!(
            entity = %T::KIND,
            conflicts = conflicts.len(),
            manual_required = resolution.manual_required,
            "reconciled snapshot"
        );
        Ok(Reconciliation {
            conflicts,
            resolution,
        })
    }

    /// Starts the timer and reconnect driver on the current Tokio runtime.
    ///
    /// The driver runs a pass every `sync_interval` and checks connectivity
    /// every `probe_interval`, running a pass at once on reconnect. It stops
    /// when the handle is shut down or dropped.
    pub fn spawn_background(&self) -> BackgroundSync {
        let (shutdown, mut stop) = watch::channel(false);
        let processor = Arc::clone(&self.processor);

        let handle = tokio::spawn(async move {
            let config = processor.config().clone();
            let mut sync_tick = tokio::time::interval(config.sync_interval);
            sync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut probe_tick = tokio::time::interval(config.probe_interval);
            probe_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(
                sync_interval = ?config.sync_interval,
                probe_interval = ?config.probe_interval,
                "background sync started"
            );

            loop {
                tokio::select! {
                    _ = sync_tick.tick() => {
                        processor.process_queue().await;
                    }
                    _ = probe_tick.tick() => {
                        if processor.refresh_connectivity().await == Transition::Reconnected {
                            processor.process_queue().await;
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
            tracing::debug!("background sync stopped");
        });

        BackgroundSync { shutdown, handle }
    }
}

impl<C, R, P> std::fmt::Debug for SyncEngine<C, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("processor", &self.processor)
            .finish()
    }
}

/// Handle to the background driver started by [`SyncEngine::spawn_background`].
#[derive(Debug)]
pub struct BackgroundSync {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundSync {
    /// Stops the driver and waits for the current pass to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "background sync task ended abnormally");
        }
    }

    /// Returns true if the driver has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
