//! The sync processor.
//!
//! A pass drains a snapshot of the pending operations in enqueue order,
//! one remote call at a time. Failures are contained per operation; a
//! pass never fails as a whole.

use crate::applier;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::probe::ConnectivityProbe;
use crate::queue::OperationQueue;
use crate::remote::RemoteStore;
use crate::status::{PersistedStatus, StatusPublisher, SyncStatus};
use chrono::{DateTime, Utc};
use ledgersync_protocol::{OperationId, OperationStatus, QueuedOperation};
use ledgersync_storage::LocalCache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass ran over its snapshot.
    Ran,
    /// Another pass was in flight; nothing was done.
    AlreadyRunning,
    /// The probe reported offline; nothing was done.
    Offline,
}

/// Summary of one call to [`SyncProcessor::process_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// How the pass ended.
    pub outcome: PassOutcome,
    /// Operations handed to an applier.
    pub attempted: usize,
    /// Operations applied remotely.
    pub completed: usize,
    /// Operations that failed and went back to pending.
    pub requeued: usize,
    /// Operations that failed and ran out of retries.
    pub failed: usize,
    /// Snapshot entries that changed or vanished before their turn.
    pub skipped: usize,
}

impl PassReport {
    fn new(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            attempted: 0,
            completed: 0,
            requeued: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Returns true if the pass actually ran.
    pub fn ran(&self) -> bool {
        self.outcome == PassOutcome::Ran
    }
}

/// A change in observed connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same state as before.
    Unchanged,
    /// Went from offline to online.
    Reconnected,
    /// Went from online to offline.
    Disconnected,
}

#[derive(Debug, Default)]
struct ProcessorState {
    online: bool,
    syncing: bool,
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the operation queue against the remote store.
pub struct SyncProcessor<C, R, P> {
    config: SyncConfig,
    queue: OperationQueue<Arc<C>>,
    remote: Arc<R>,
    probe: Arc<P>,
    publisher: StatusPublisher,
    in_flight: AtomicBool,
    state: Mutex<ProcessorState>,
}

impl<C, R, P> SyncProcessor<C, R, P>
where
    C: LocalCache + 'static,
    R: RemoteStore + 'static,
    P: ConnectivityProbe + 'static,
{
    /// Creates a processor, loading the queue and status record from `cache`.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read or decoded.
    pub fn new(
        config: SyncConfig,
        cache: Arc<C>,
        remote: Arc<R>,
        probe: Arc<P>,
    ) -> SyncResult<Self> {
        let persisted = PersistedStatus::load(&*cache, &config.status_key)?;
        let queue = OperationQueue::open(cache, config.queue_key.clone(), config.retry.max_retries)?;

        Ok(Self {
            config,
            queue,
            remote,
            probe,
            publisher: StatusPublisher::new(),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(ProcessorState {
                last_sync_at: persisted.last_sync_at,
                ..ProcessorState::default()
            }),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the operation queue.
    pub fn queue(&self) -> &OperationQueue<Arc<C>> {
        &self.queue
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns the status publisher.
    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    /// Computes the current status from the queue and processor state.
    pub fn status(&self) -> SyncStatus {
        let counts = self.queue.counts();
        let state = self.state.lock();
        SyncStatus {
            is_online: state.online,
            is_syncing: state.syncing,
            last_sync_at: state.last_sync_at,
            pending_count: counts.outstanding(),
            failed_count: counts.failed,
            last_error: state.last_error.clone(),
        }
    }

    /// Publishes the current status to every listener.
    pub fn publish(&self) {
        self.publisher.publish(&self.status());
    }

    /// Records the observed connectivity, publishing on change.
    pub fn set_online(&self, online: bool) -> Transition {
        let previous = std::mem::replace(&mut self.state.lock().online, online);
        let transition = match (previous, online) {
            (false, true) => Transition::Reconnected,
            (true, false) => Transition::Disconnected,
            _ => Transition::Unchanged,
        };
        if transition != Transition::Unchanged {
            tracing::info!(online, "connectivity changed");
            self.publish();
        }
        transition
    }

    /// Asks the probe and records the answer.
    pub async fn refresh_connectivity(&self) -> Transition {
        let online = self.probe.is_online().await;
        self.set_online(online)
    }

    /// Returns true if the last observed connectivity was online.
    pub fn is_online(&self) -> bool {
        self.state.lock().online
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    /// Runs one pass over the pending operations.
    ///
    /// Returns immediately if another pass is in flight or the probe reports
    /// offline. Operations enqueued while the pass runs wait for the next one.
    pub async fn process_queue(self: &Arc<Self>) -> PassReport {
        let Some(_in_flight) = self.try_begin() else {
            tracing::debug!("sync pass already running");
            return PassReport::new(PassOutcome::AlreadyRunning);
        };

        self.refresh_connectivity().await;
        if !self.is_online() {
            tracing::debug!("offline, skipping sync pass");
            return PassReport::new(PassOutcome::Offline);
        }

        self.state.lock().syncing = true;
        self.publish();

        let snapshot = self.queue.eligible(Utc::now());
        tracing::info!(operations = snapshot.len(), "sync pass started");

        let mut report = PassReport::new(PassOutcome::Ran);
        for op in &snapshot {
            match self.apply_operation(op).await {
                Some(status) => {
                    report.attempted += 1;
                    match status {
                        OperationStatus::Completed => report.completed += 1,
                        OperationStatus::Failed => report.failed += 1,
                        OperationStatus::Pending | OperationStatus::Processing => {
                            report.requeued += 1
                        }
                    }
                }
                None => report.skipped += 1,
            }
        }

        self.finish_pass(&report);
        tracing::info!(
            attempted = report.attempted,
            completed = report.completed,
            requeued = report.requeued,
            failed = report.failed,
            skipped = report.skipped,
            "sync pass finished"
        );
        report
    }

    fn finish_pass(&self, report: &PassReport) {
        let finished_at = Utc::now();
        let clean = report.requeued == 0 && report.failed == 0 && self.queue.counts().failed == 0;
        {
            let mut state = self.state.lock();
            state.syncing = false;
            state.last_sync_at = Some(finished_at);
            if clean {
                state.last_error = None;
            }
        }

        let persisted = PersistedStatus {
            last_sync_at: Some(finished_at),
        };
        if let Err(e) = persisted.save(&**self.queue.cache(), &self.config.status_key) {
            tracing::warn!(error = %e, "failed to persist sync status");
        }
        self.publish();
    }

    /// Applies one operation and records the outcome.
    ///
    /// Returns the resulting status, or `None` if the operation is no longer
    /// pending (removed or changed since the snapshot was taken).
    pub async fn apply_operation(self: &Arc<Self>, op: &QueuedOperation) -> Option<OperationStatus> {
        let current = self.queue.update(op.id, |queued| {
            if queued.status == OperationStatus::Pending {
                queued.mark_processing();
            }
        })?;
        if current.status != OperationStatus::Processing {
            return None;
        }
        self.publish();

        let operation = &current.operation;
        tracing::debug!(
            op_id = %op.id,
            kind = %operation.kind(),
            entity = %operation.entity_kind(),
            entity_id = operation.entity_id(),
            retry_count = current.retry_count,
            "applying operation"
        );

        let status = match applier::apply(&*self.remote, operation).await {
            Ok(applied) => {
                self.queue.update(op.id, QueuedOperation::mark_completed);
                tracing::info!(
                    op_id = %op.id,
                    entity = %operation.entity_kind(),
                    entity_id = operation.entity_id(),
                    applied = %applied,
                    "operation applied"
                );
                self.schedule_removal(op.id);
                OperationStatus::Completed
            }
            Err(e) => {
                let message = e.to_string();
                let next_attempt_at = self
                    .config
                    .retry
                    .next_attempt_at(current.retry_count.saturating_add(1), Utc::now());
                let updated = self.queue.update(op.id, |queued| {
                    queued.record_failure(message.clone(), next_attempt_at);
                });
                self.state.lock().last_error = Some(message);

                let status = updated.as_ref().map_or(OperationStatus::Failed, |q| q.status);
                let retry_count = updated.map_or(current.retry_count, |q| q.retry_count);
                if status == OperationStatus::Failed {
                    tracing::error!(
                        op_id = %op.id,
                        entity = %operation.entity_kind(),
                        entity_id = operation.entity_id(),
                        retry_count,
                        error = %e,
                        "operation failed permanently"
                    );
                } else {
                    tracing::warn!(
                        op_id = %op.id,
                        entity = %operation.entity_kind(),
                        entity_id = operation.entity_id(),
                        retry_count,
                        retryable = e.is_retryable(),
                        error = %e,
                        "operation failed, will retry"
                    );
                }
                status
            }
        };

        self.publish();
        Some(status)
    }

    fn schedule_removal(self: &Arc<Self>, id: OperationId) {
        let grace = self.config.completion_grace;
        if grace.is_zero() {
            self.remove_completed(id);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let this = Arc::clone(self);
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    this.remove_completed(id);
                });
            }
            Err(_) => {
                tracing::debug!(op_id = %id, "no runtime; removing completed operation now");
                self.remove_completed(id);
            }
        }
    }

    fn remove_completed(&self, id: OperationId) {
        if self
            .queue
            .remove_if(id, |op| op.status == OperationStatus::Completed)
            .is_some()
        {
            tracing::debug!(op_id = %id, "removed completed operation");
            self.publish();
        }
    }

    /// Resets failed operations to pending and runs a pass if online.
    ///
    /// Returns the number of operations reset.
    pub async fn retry_failed(self: &Arc<Self>) -> usize {
        let reset = self.queue.reset_failed();
        if reset > 0 {
            tracing::info!(reset, "reset failed operations");
            self.state.lock().last_error = None;
        }
        self.publish();
        self.process_queue().await;
        reset
    }
}

impl<C, R, P> std::fmt::Debug for SyncProcessor<C, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProcessor")
            .field("queue", &self.queue)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::error::RemoteError;
    use crate::probe::ManualProbe;
    use crate::remote::MemoryRemoteStore;
    use ledgersync_protocol::{EntityKind, Operation, SessionStatus};
    use ledgersync_storage::InMemoryCache;
    use ledgersync_testkit::prelude::*;
    use std::time::Duration;

    type Processor = SyncProcessor<InMemoryCache, MemoryRemoteStore, ManualProbe>;

    fn processor(config: SyncConfig) -> Arc<Processor> {
        Arc::new(
            SyncProcessor::new(
                config,
                Arc::new(InMemoryCache::new()),
                Arc::new(MemoryRemoteStore::new()),
                Arc::new(ManualProbe::new(true)),
            )
            .unwrap(),
        )
    }

    fn immediate() -> SyncConfig {
        SyncConfig::new().with_completion_grace(Duration::ZERO)
    }

    #[tokio::test]
    async fn pass_applies_in_enqueue_order() {
        let processor = processor(immediate());
        processor.remote().set_enforce_references(true);
        processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", 40)));
        processor
            .queue()
            .enqueue(Operation::create(session("s1", "c1", SessionStatus::Active)));

        let report = processor.process_queue().await;
        assert_eq!(report.outcome, PassOutcome::Ran);
        assert_eq!(report.completed, 2);
        assert!(processor.queue().is_empty());
        assert_eq!(
            processor.remote().calls(),
            vec!["create client:c1", "create session:s1"]
        );
    }

    #[tokio::test]
    async fn offline_pass_leaves_queue_untouched() {
        let processor = processor(immediate());
        processor.probe.set_online(false);
        let id = processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", 40)));
        let before = processor.queue().get(id);

        let report = processor.process_queue().await;
        assert_eq!(report.outcome, PassOutcome::Offline);
        assert_eq!(processor.queue().get(id), before);
        assert!(processor.remote().calls().is_empty());
        assert!(processor.status().last_sync_at.is_none());
    }

    #[tokio::test]
    async fn failures_retry_up_to_cap() {
        let processor = processor(immediate().with_retry(RetryConfig::new(2)));
        processor
            .remote()
            .fail_always_for("c1", RemoteError::transport("connection reset"));
        let id = processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", 40)));

        let first = processor.process_queue().await;
        assert_eq!(first.requeued, 1);
        let op = processor.queue().get(id).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.retry_count, 1);
        assert_eq!(op.last_error.as_deref(), Some("connection reset"));

        let second = processor.process_queue().await;
        assert_eq!(second.failed, 1);
        let op = processor.queue().get(id).unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.retry_count, 2);

        let third = processor.process_queue().await;
        assert_eq!(third.attempted, 0);

        let status = processor.status();
        assert_eq!(status.failed_count, 1);
        assert_eq!(status.pending_count, 0);
        assert_eq!(status.last_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let processor = processor(immediate());
        processor
            .remote()
            .fail_always_for("c1", RemoteError::rejected("rate must be positive"));
        processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", -1)));
        processor
            .queue()
            .enqueue(Operation::create(client("c2", "Bo", 40)));

        let report = processor.process_queue().await;
        assert_eq!(report.requeued, 1);
        assert_eq!(report.completed, 1);
        assert!(processor.remote().contains(EntityKind::Client, "c2"));
    }

    #[tokio::test]
    async fn retry_failed_resets_and_runs() {
        let processor = processor(immediate().with_retry(RetryConfig::new(1)));
        processor
            .remote()
            .fail_always_for("c1", RemoteError::timeout("timed out"));
        processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", 40)));
        processor.process_queue().await;
        assert_eq!(processor.status().failed_count, 1);

        processor.remote().clear_failures();
        assert_eq!(processor.retry_failed().await, 1);
        assert!(processor.queue().is_empty());
        assert!(processor.status().last_error.is_none());
    }

    #[tokio::test]
    async fn last_sync_at_survives_restart() {
        let cache = Arc::new(InMemoryCache::new());
        let first = Arc::new(
            SyncProcessor::new(
                immediate(),
                Arc::clone(&cache),
                Arc::new(MemoryRemoteStore::new()),
                Arc::new(ManualProbe::new(true)),
            )
            .unwrap(),
        );
        first.process_queue().await;
        let synced = first.status().last_sync_at;
        assert!(synced.is_some());

        let second = SyncProcessor::new(
            immediate(),
            cache,
            Arc::new(MemoryRemoteStore::new()),
            Arc::new(ManualProbe::new(false)),
        )
        .unwrap();
        assert_eq!(second.status().last_sync_at, synced);
    }

    #[tokio::test]
    async fn backoff_defers_next_attempt() {
        let retry = RetryConfig::new(5)
            .with_exponential_backoff(Duration::from_secs(60), Duration::from_secs(600));
        let processor = processor(immediate().with_retry(retry));
        processor.remote().fail_next(RemoteError::transport("reset"));
        let id = processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", 40)));

        processor.process_queue().await;
        let op = processor.queue().get(id).unwrap();
        assert!(op.next_attempt_at.is_some());

        let report = processor.process_queue().await;
        assert_eq!(report.attempted, 0);
        assert_eq!(processor.queue().get(id).unwrap().retry_count, 1);
    }

    #[test]
    fn removal_without_runtime_is_immediate() {
        let processor = processor(SyncConfig::new().with_completion_grace(Duration::from_secs(2)));
        let id = processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", 40)));
        processor.queue().update(id, QueuedOperation::mark_completed);

        processor.schedule_removal(id);
        assert!(processor.queue().get(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn removal_inside_runtime_waits_for_grace() {
        let processor = processor(SyncConfig::new().with_completion_grace(Duration::from_secs(2)));
        let id = processor
            .queue()
            .enqueue(Operation::create(client("c1", "Ana", 40)));
        processor.queue().update(id, QueuedOperation::mark_completed);

        processor.schedule_removal(id);
        assert!(processor.queue().get(id).is_some());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(processor.queue().get(id).is_none());
    }
}
