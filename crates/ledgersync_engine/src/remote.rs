//! Remote store abstraction.

use crate::error::{RemoteError, RemoteErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgersync_protocol::{EntityKind, EntityRecord, Record};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Filter for [`RemoteStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Only records modified at or after this instant.
    pub modified_since: Option<DateTime<Utc>>,
}

impl ListFilter {
    /// A filter matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Limits the result size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restricts the result to records modified at or after `since`.
    pub fn modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.modified_since = Some(since);
        self
    }
}

/// The authoritative remote data service.
///
/// This trait abstracts the network layer so the processor can be driven
/// by a real client or by [`MemoryRemoteStore`] in tests. Every call may
/// fail with a [`RemoteError`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a record.
    async fn create(
        &self,
        kind: EntityKind,
        record: &EntityRecord,
    ) -> Result<EntityRecord, RemoteError>;

    /// Replaces the record `id` with `patch`.
    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: &EntityRecord,
    ) -> Result<EntityRecord, RemoteError>;

    /// Deletes the record `id`.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError>;

    /// Lists records of one kind.
    async fn list(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> Result<Vec<EntityRecord>, RemoteError>;
}

#[async_trait]
impl<R: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<R> {
    async fn create(
        &self,
        kind: EntityKind,
        record: &EntityRecord,
    ) -> Result<EntityRecord, RemoteError> {
        (**self).create(kind, record).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: &EntityRecord,
    ) -> Result<EntityRecord, RemoteError> {
        (**self).update(kind, id, patch).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        (**self).delete(kind, id).await
    }

    async fn list(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> Result<Vec<EntityRecord>, RemoteError> {
        (**self).list(kind, filter).await
    }
}

fn modified_at(record: &EntityRecord) -> Option<DateTime<Utc>> {
    match record {
        EntityRecord::Client(r) => r.modified_at(),
        EntityRecord::Session(r) => r.modified_at(),
        EntityRecord::Payment(r) => r.modified_at(),
        EntityRecord::Activity(r) => r.modified_at(),
    }
}

fn referenced_client(record: &EntityRecord) -> Option<&str> {
    match record {
        EntityRecord::Session(r) => Some(&r.client_id),
        EntityRecord::Payment(r) => Some(&r.client_id),
        EntityRecord::Client(_) | EntityRecord::Activity(_) => None,
    }
}

/// An in-memory remote store for testing.
///
/// Supports toggling reachability, scripted one-shot failures, sticky
/// per-identity failures, artificial latency, and optional client
/// reference checks for sessions and payments.
#[derive(Debug)]
pub struct MemoryRemoteStore {
    tables: Mutex<BTreeMap<EntityKind, BTreeMap<String, EntityRecord>>>,
    reachable: AtomicBool,
    enforce_references: AtomicBool,
    scripted: Mutex<VecDeque<RemoteError>>,
    sticky: Mutex<HashMap<String, RemoteError>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl MemoryRemoteStore {
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            reachable: AtomicBool::new(true),
            enforce_references: AtomicBool::new(false),
            scripted: Mutex::new(VecDeque::new()),
            sticky: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets whether calls reach the store.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Returns true if calls reach the store.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Rejects sessions and payments whose client does not exist.
    pub fn set_enforce_references(&self, enforce: bool) {
        self.enforce_references.store(enforce, Ordering::SeqCst);
    }

    /// Fails the next mutating call with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.scripted.lock().push_back(error);
    }

    /// Fails every mutating call on identity `id` until cleared.
    pub fn fail_always_for(&self, id: impl Into<String>, error: RemoteError) {
        self.sticky.lock().insert(id.into(), error);
    }

    /// Clears sticky failures.
    pub fn clear_failures(&self) {
        self.sticky.lock().clear();
        self.scripted.lock().clear();
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Seeds a record without going through the call path.
    pub fn insert(&self, record: impl Into<EntityRecord>) {
        let record = record.into();
        self.tables
            .lock()
            .entry(record.kind())
            .or_default()
            .insert(record.id().to_string(), record);
    }

    /// Returns a stored record.
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<EntityRecord> {
        self.tables.lock().get(&kind).and_then(|t| t.get(id).cloned())
    }

    /// Returns true if the record exists.
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.get(kind, id).is_some()
    }

    /// Returns every stored record of one kind, ordered by identity.
    pub fn records(&self, kind: EntityKind) -> Vec<EntityRecord> {
        self.tables
            .lock()
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the log of mutating calls, e.g. `"create session:s1"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    async fn enter(&self, call: Option<String>) -> Result<(), RemoteError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.is_reachable() {
            return Err(RemoteError::transport("network unreachable"));
        }
        if let Some(call) = call {
            self.calls.lock().push(call);
            if let Some(error) = self.scripted.lock().pop_front() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn sticky_failure(&self, id: &str) -> Result<(), RemoteError> {
        match self.sticky.lock().get(id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn check_kind(kind: EntityKind, record: &EntityRecord) -> Result<(), RemoteError> {
        if record.kind() != kind {
            return Err(RemoteError::rejected(format!(
                "payload of kind {} sent to {kind}",
                record.kind()
            )));
        }
        Ok(())
    }

    fn check_references(&self, record: &EntityRecord) -> Result<(), RemoteError> {
        if !self.enforce_references.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(client_id) = referenced_client(record) {
            if !self.contains(EntityKind::Client, client_id) {
                return Err(RemoteError::rejected(format!(
                    "{} {} references missing client {client_id}",
                    record.kind(),
                    record.id()
                )));
            }
        }
        Ok(())
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn create(
        &self,
        kind: EntityKind,
        record: &EntityRecord,
    ) -> Result<EntityRecord, RemoteError> {
        self.enter(Some(format!("create {kind}:{}", record.id())))
            .await?;
        self.sticky_failure(record.id())?;
        Self::check_kind(kind, record)?;
        self.check_references(record)?;

        let mut tables = self.tables.lock();
        let table = tables.entry(kind).or_default();
        if table.contains_key(record.id()) {
            return Err(RemoteError::already_exists(format!(
                "{kind} {} already exists",
                record.id()
            )));
        }
        table.insert(record.id().to_string(), record.clone());
        Ok(record.clone())
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        patch: &EntityRecord,
    ) -> Result<EntityRecord, RemoteError> {
        self.enter(Some(format!("update {kind}:{id}"))).await?;
        self.sticky_failure(id)?;
        Self::check_kind(kind, patch)?;
        if patch.id() != id {
            return Err(RemoteError::rejected(format!(
                "payload id {} does not match {id}",
                patch.id()
            )));
        }
        self.check_references(patch)?;

        let mut tables = self.tables.lock();
        let table = tables.entry(kind).or_default();
        match table.get_mut(id) {
            Some(existing) => {
                *existing = patch.clone();
                Ok(patch.clone())
            }
            None => Err(RemoteError::not_found(format!("{kind} {id} not found"))),
        }
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), RemoteError> {
        self.enter(Some(format!("delete {kind}:{id}"))).await?;
        self.sticky_failure(id)?;

        let removed = self
            .tables
            .lock()
            .get_mut(&kind)
            .and_then(|t| t.remove(id));
        match removed {
            Some(_) => Ok(()),
            None => Err(RemoteError::new(
                RemoteErrorKind::NotFound,
                format!("{kind} {id} not found"),
            )),
        }
    }

    async fn list(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
    ) -> Result<Vec<EntityRecord>, RemoteError> {
        self.enter(None).await?;
        let records = self
            .records(kind)
            .into_iter()
            .filter(|r| match filter.modified_since {
                Some(since) => modified_at(r).map_or(false, |at| at >= since),
                None => true,
            })
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(records)
    }
}
