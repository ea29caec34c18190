//! Queued sync operations.

use crate::entity::{EntityKind, EntityRecord, EntityRef};
use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default retry cap stamped onto new operations.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Unique identifier of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for OperationId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidOperationId(s.to_string()))
    }
}

/// Type of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Entity was created locally.
    Create,
    /// Entity was modified locally.
    Update,
    /// Entity was deleted locally.
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        })
    }
}

/// A single create/update/delete intent against one entity.
///
/// Create and update carry the full record; delete carries only the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create the record remotely.
    Create(EntityRecord),
    /// Replace the remote record with this one.
    Update(EntityRecord),
    /// Remove the named record remotely.
    Delete(EntityRef),
}

impl Operation {
    /// Creates a create operation.
    pub fn create(record: impl Into<EntityRecord>) -> Self {
        Operation::Create(record.into())
    }

    /// Creates an update operation.
    pub fn update(record: impl Into<EntityRecord>) -> Self {
        Operation::Update(record.into())
    }

    /// Creates a delete operation.
    pub fn delete(kind: EntityKind, id: impl Into<String>) -> Self {
        Operation::Delete(EntityRef::new(kind, id))
    }

    /// Returns the operation type.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create(_) => OperationKind::Create,
            Operation::Update(_) => OperationKind::Update,
            Operation::Delete(_) => OperationKind::Delete,
        }
    }

    /// Returns the kind of entity this operation targets.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Operation::Create(record) | Operation::Update(record) => record.kind(),
            Operation::Delete(target) => target.kind,
        }
    }

    /// Returns the identity of the targeted entity.
    pub fn entity_id(&self) -> &str {
        match self {
            Operation::Create(record) | Operation::Update(record) => record.id(),
            Operation::Delete(target) => &target.id,
        }
    }
}

/// Processing state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for a sync pass.
    Pending,
    /// Being applied by the current pass.
    Processing,
    /// Applied remotely; kept briefly for observers.
    Completed,
    /// Exhausted its retries; waits for an explicit reset.
    Failed,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Processing => "processing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        })
    }
}

/// An operation in the durable queue together with its bookkeeping.
///
/// # Invariants
///
/// - `retry_count <= max_retries` while `status != Failed`
/// - A `Failed` operation is never picked up automatically
/// - Only the sync processor mutates status, retry count and last error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Unique id assigned at enqueue time.
    pub id: OperationId,
    /// The intent to deliver.
    pub operation: Operation,
    /// Snapshot of the local record before the operation, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_reference: Option<EntityRecord>,
    /// When the operation was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed attempts so far.
    pub retry_count: u32,
    /// Attempts allowed before the operation is marked failed.
    pub max_retries: u32,
    /// Last failure reason, verbatim from the remote store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Processing state.
    pub status: OperationStatus,
    /// Earliest time of the next attempt when backoff is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedOperation {
    /// Wraps an operation as a fresh pending queue entry.
    pub fn new(operation: Operation, max_retries: u32, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: OperationId::new(),
            operation,
            local_reference: None,
            enqueued_at,
            retry_count: 0,
            max_retries,
            last_error: None,
            status: OperationStatus::Pending,
            next_attempt_at: None,
        }
    }

    /// Attaches the pre-operation local record.
    pub fn with_local_reference(mut self, record: EntityRecord) -> Self {
        self.local_reference = Some(record);
        self
    }

    /// Returns true if a pass starting at `now` should attempt this operation.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == OperationStatus::Pending
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Marks the operation as being applied.
    pub fn mark_processing(&mut self) {
        self.status = OperationStatus::Processing;
    }

    /// Marks the operation as applied.
    pub fn mark_completed(&mut self) {
        self.status = OperationStatus::Completed;
        self.last_error = None;
        self.next_attempt_at = None;
    }

    /// Records a failed attempt and returns the resulting status.
    ///
    /// The operation goes back to `Pending` until `retry_count` reaches
    /// `max_retries`, at which point it becomes `Failed`.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> OperationStatus {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.into());
        if self.retry_count >= self.max_retries {
            self.status = OperationStatus::Failed;
            self.next_attempt_at = None;
        } else {
            self.status = OperationStatus::Pending;
            self.next_attempt_at = next_attempt_at;
        }
        self.status
    }

    /// Puts a failed operation back into automatic processing.
    pub fn reset(&mut self) {
        self.status = OperationStatus::Pending;
        self.retry_count = 0;
        self.last_error = None;
        self.next_attempt_at = None;
    }
}
