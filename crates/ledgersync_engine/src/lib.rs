//! # ledgersync Engine
//!
//! Offline-first sync engine for ledgersync.
//!
//! This crate provides:
//! - A durable, ordered operation queue persisted to a local cache
//! - A sync processor draining the queue against a remote store
//! - Per-entity appliers with idempotent create and delete
//! - Bounded retries with optional exponential backoff
//! - Sync status snapshots pushed to subscribed listeners
//! - A background driver running passes on a timer and on reconnect
//!
//! ## Architecture
//!
//! Writes never wait for the network:
//! 1. The caller enqueues an operation; it is persisted immediately
//! 2. When online, a pass applies pending operations oldest first
//! 3. Failures go back to pending until their retry budget runs out
//! 4. Completed operations stay visible briefly, then leave the queue
//!
//! ## Key Invariants
//!
//! - At most one pass runs at a time
//! - Operations within a pass are applied sequentially in enqueue order
//! - No operation is marked failed before `max_retries` attempts
//! - A failed operation only re-enters processing through an explicit retry
//! - Persistence failures are logged, never propagated

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod config;
mod engine;
mod error;
mod probe;
mod processor;
mod queue;
mod remote;
mod status;

pub use applier::{apply, Applied};
pub use config::{Backoff, RetryConfig, SyncConfig, DEFAULT_QUEUE_KEY, DEFAULT_STATUS_KEY};
pub use engine::{BackgroundSync, Reconciliation, SyncEngine};
pub use error::{PersistError, RemoteError, RemoteErrorKind, SyncError, SyncResult};
pub use probe::{ConnectivityProbe, ManualProbe, RemoteProbe};
pub use processor::{PassOutcome, PassReport, SyncProcessor, Transition};
pub use queue::{OperationQueue, QueueCounts};
pub use remote::{ListFilter, MemoryRemoteStore, RemoteStore};
pub use status::{PersistedStatus, StatusPublisher, Subscription, SyncStatus};
