//! Translation of queued operations into remote store calls.
//!
//! The entity kind travels with the typed payload and selects the remote
//! collection; the store enforces per-kind rules such as a session's client
//! reference. Appliers are idempotent against replays: a create that meets
//! an existing record and a delete that meets a missing record both count
//! as delivered.

use crate::error::{RemoteError, RemoteErrorKind};
use crate::remote::RemoteStore;
use ledgersync_protocol::Operation;
use std::fmt;

/// What an applied operation did remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The record was created.
    Created,
    /// The record existed already and was left as it is.
    Replayed,
    /// The record was updated.
    Updated,
    /// The record was deleted.
    Deleted,
    /// The record was already gone.
    AlreadyDeleted,
}

impl fmt::Display for Applied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Applied::Created => "created",
            Applied::Replayed => "replayed",
            Applied::Updated => "updated",
            Applied::Deleted => "deleted",
            Applied::AlreadyDeleted => "already_deleted",
        })
    }
}

/// Applies one operation to the remote store.
///
/// A replayed create never writes: the remote copy may have moved on
/// since the create was first delivered.
///
/// # Errors
///
/// Returns the remote store's error unchanged.
pub async fn apply<R: RemoteStore + ?Sized>(
    remote: &R,
    operation: &Operation,
) -> Result<Applied, RemoteError> {
    let kind = operation.entity_kind();
    match operation {
        Operation::Create(record) => match remote.create(kind, record).await {
            Ok(_) => Ok(Applied::Created),
            Err(e) if e.kind == RemoteErrorKind::AlreadyExists => {
                tracing::debug!(entity = %kind, id = record.id(), "create already delivered");
                Ok(Applied::Replayed)
            }
            Err(e) => Err(e),
        },
        Operation::Update(record) => {
            remote.update(kind, record.id(), record).await?;
            Ok(Applied::Updated)
        }
        Operation::Delete(target) => match remote.delete(kind, &target.id).await {
            Ok(()) => Ok(Applied::Deleted),
            Err(e) if e.kind == RemoteErrorKind::NotFound => Ok(Applied::AlreadyDeleted),
            Err(e) => Err(e),
        },
    }
}
