//! # ledgersync protocol
//!
//! Entity model, queued operations, and conflict handling for ledgersync.
//!
//! This crate provides:
//! - Typed records for the four synchronized entity kinds
//!   ([`Client`], [`Session`], [`Payment`], [`Activity`])
//! - [`Operation`] and [`QueuedOperation`] for the durable sync queue
//! - [`detect`] for diffing a local and a remote collection
//! - [`ConflictResolver`] and [`resolve`] with pluggable strategies,
//!   including field-level merges for clients, sessions, and payments
//!
//! This is a pure data crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - A conflict is only produced for identities whose records differ
//! - Merged session status never regresses
//!   (`active < unpaid < requested < paid`)
//! - The `manual` strategy never produces data

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod entity;
mod error;
mod merge;
mod operation;
mod resolve;

pub use conflict::{changed_fields, detect, detect_by, ConflictRecord, ConflictType};
pub use entity::{
    is_well_formed_id, Activity, Client, EntityKind, EntityRecord, EntityRef, Payment,
    PaymentMethod, Record, Session, SessionStatus,
};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{
    Operation, OperationId, OperationKind, OperationStatus, QueuedOperation, DEFAULT_MAX_RETRIES,
};
pub use resolve::{
    resolve, resolve_batch, BatchResolution, ConflictResolver, Resolution, ResolutionAction,
    ResolutionStrategy,
};
