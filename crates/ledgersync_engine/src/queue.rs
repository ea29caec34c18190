//! Durable operation queue.
//!
//! The queue is an in-memory list mirrored to one key of a [`LocalCache`].
//! Every mutation rewrites the whole list as CBOR. A failed write is
//! logged and the in-memory state stays authoritative; the next
//! successful write catches the cache up.

use crate::error::{PersistError, SyncError, SyncResult};
use chrono::{DateTime, Utc};
use ledgersync_protocol::{
    is_well_formed_id, EntityRecord, Operation, OperationId, OperationStatus, QueuedOperation,
};
use ledgersync_storage::LocalCache;
use parking_lot::RwLock;

/// Number of operations in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    /// Waiting for a pass.
    pub pending: usize,
    /// Being applied.
    pub processing: usize,
    /// Applied, awaiting removal.
    pub completed: usize,
    /// Out of retries.
    pub failed: usize,
}

impl QueueCounts {
    /// Operations not yet delivered and still eligible for automatic work.
    pub fn outstanding(&self) -> usize {
        self.pending + self.processing
    }

    /// Total number of operations.
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// The durable, ordered list of not-yet-delivered operations.
pub struct OperationQueue<C> {
    cache: C,
    key: String,
    max_retries: u32,
    operations: RwLock<Vec<QueuedOperation>>,
}

impl<C: LocalCache> OperationQueue<C> {
    /// Opens the queue stored under `key`, loading any persisted operations.
    ///
    /// A missing key yields an empty queue. Operations persisted while
    /// `Processing` were interrupted mid-pass and are put back to `Pending`.
    /// Operations persisted as `Completed` were delivered before their
    /// removal ran and are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read or the stored bytes
    /// cannot be decoded.
    pub fn open(cache: C, key: impl Into<String>, max_retries: u32) -> SyncResult<Self> {
        let key = key.into();
        let mut operations: Vec<QueuedOperation> = match cache.get(&key)? {
            Some(bytes) => ciborium::from_reader(bytes.as_slice())
                .map_err(|e| SyncError::Codec(format!("queue under {key}: {e}")))?,
            None => Vec::new(),
        };

        let loaded = operations.len();
        operations.retain(|op| op.status != OperationStatus::Completed);
        let pruned = loaded - operations.len();

        let mut interrupted = 0;
        for op in operations
            .iter_mut()
            .filter(|op| op.status == OperationStatus::Processing)
        {
            op.status = OperationStatus::Pending;
            interrupted += 1;
        }

        tracing::debug!(
            key = %key,
            operations = operations.len(),
            interrupted,
            pruned,
            "loaded operation queue"
        );

        Ok(Self {
            cache,
            key,
            max_retries,
            operations: RwLock::new(operations),
        })
    }

    /// Returns the cache key backing this queue.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the underlying cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Writes the current state to the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the cache write fails.
    pub fn persist(&self) -> Result<(), PersistError> {
        let operations = self.operations.read();
        self.write(&operations)
    }

    fn write(&self, operations: &[QueuedOperation]) -> Result<(), PersistError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(&operations, &mut bytes)
            .map_err(|e| PersistError::Encode(e.to_string()))?;
        self.cache.set(&self.key, &bytes)?;
        Ok(())
    }

    fn write_or_warn(&self, operations: &[QueuedOperation]) {
        if let Err(e) = self.write(operations) {
            tracing::warn!(
                key = %self.key,
                error = %e,
                "failed to persist operation queue; keeping in-memory state"
            );
        }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<QueuedOperation>) -> T) -> T {
        let mut operations = self.operations.write();
        let result = f(&mut operations);
        self.write_or_warn(&operations);
        result
    }

    /// Appends a pending operation and returns its id.
    pub fn enqueue(&self, operation: Operation) -> OperationId {
        self.push(QueuedOperation::new(operation, self.max_retries, Utc::now()))
    }

    /// Appends a pending operation carrying the pre-operation local record.
    pub fn enqueue_with_reference(
        &self,
        operation: Operation,
        local_reference: EntityRecord,
    ) -> OperationId {
        self.push(
            QueuedOperation::new(operation, self.max_retries, Utc::now())
                .with_local_reference(local_reference),
        )
    }

    fn push(&self, queued: QueuedOperation) -> OperationId {
        let id = queued.id;
        tracing::debug!(
            operation_id = %id,
            kind = %queued.operation.kind(),
            entity = %queued.operation.entity_kind(),
            entity_id = queued.operation.entity_id(),
            "enqueued operation"
        );
        self.mutate(|ops| ops.push(queued));
        id
    }

    /// Returns a copy of one operation.
    pub fn get(&self, id: OperationId) -> Option<QueuedOperation> {
        self.operations.read().iter().find(|op| op.id == id).cloned()
    }

    /// Returns a copy of every operation in queue order.
    pub fn all(&self) -> Vec<QueuedOperation> {
        self.operations.read().clone()
    }

    /// Returns the operations a pass starting at `now` should attempt,
    /// ordered by enqueue time.
    pub fn eligible(&self, now: DateTime<Utc>) -> Vec<QueuedOperation> {
        let mut eligible: Vec<_> = self
            .operations
            .read()
            .iter()
            .filter(|op| op.is_eligible(now))
            .cloned()
            .collect();
        eligible.sort_by_key(|op| op.enqueued_at);
        eligible
    }

    /// Applies `f` to one operation and persists.
    ///
    /// Returns the updated copy, or `None` if the operation is gone.
    pub fn update(
        &self,
        id: OperationId,
        f: impl FnOnce(&mut QueuedOperation),
    ) -> Option<QueuedOperation> {
        self.mutate(|ops| {
            ops.iter_mut().find(|op| op.id == id).map(|op| {
                f(op);
                op.clone()
            })
        })
    }

    /// Removes one operation.
    pub fn remove(&self, id: OperationId) -> Option<QueuedOperation> {
        self.remove_if(id, |_| true)
    }

    /// Removes one operation if it still satisfies `predicate`.
    pub fn remove_if(
        &self,
        id: OperationId,
        predicate: impl FnOnce(&QueuedOperation) -> bool,
    ) -> Option<QueuedOperation> {
        let mut operations = self.operations.write();
        let index = operations.iter().position(|op| op.id == id)?;
        if !predicate(&operations[index]) {
            return None;
        }
        let removed = operations.remove(index);
        self.write_or_warn(&operations);
        Some(removed)
    }

    /// Puts every failed operation back to pending with a fresh retry budget.
    ///
    /// Returns the number of operations reset.
    pub fn reset_failed(&self) -> usize {
        self.mutate(|ops| {
            let mut reset = 0;
            for op in ops
                .iter_mut()
                .filter(|op| op.status == OperationStatus::Failed)
            {
                op.reset();
                reset += 1;
            }
            reset
        })
    }

    /// Removes every operation regardless of state.
    ///
    /// Returns the number of operations removed.
    pub fn clear(&self) -> usize {
        let removed = self.mutate(std::mem::take);
        tracing::info!(key = %self.key, removed = removed.len(), "cleared operation queue");
        removed.len()
    }

    /// Removes operations whose target identity is malformed.
    ///
    /// Returns the removed operations. When nothing is malformed the cache
    /// is left untouched.
    pub fn repair(&self) -> Vec<QueuedOperation> {
        let mut operations = self.operations.write();
        if operations
            .iter()
            .all(|op| is_well_formed_id(op.operation.entity_id()))
        {
            return Vec::new();
        }

        let (keep, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut *operations)
            .into_iter()
            .partition(|op| is_well_formed_id(op.operation.entity_id()));
        *operations = keep;
        self.write_or_warn(&operations);
        drop(operations);

        for op in &removed {
            tracing::warn!(
                operation_id = %op.id,
                entity = %op.operation.entity_kind(),
                entity_id = op.operation.entity_id(),
                "removed operation with malformed identity"
            );
        }
        removed
    }

    /// Counts operations by state.
    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for op in self.operations.read().iter() {
            match op.status {
                OperationStatus::Pending => counts.pending += 1,
                OperationStatus::Processing => counts.processing += 1,
                OperationStatus::Completed => counts.completed += 1,
                OperationStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }
}

impl<C> std::fmt::Debug for OperationQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("key", &self.key)
            .field("len", &self.operations.read().len())
            .finish()
    }
}
