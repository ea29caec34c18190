//! Error types for the protocol crate.

use crate::entity::EntityKind;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting protocol values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A record of one kind was used where another kind was expected.
    #[error("expected a {expected} record, found {found}")]
    KindMismatch {
        /// Kind the caller asked for.
        expected: EntityKind,
        /// Kind actually present.
        found: EntityKind,
    },

    /// An operation identifier could not be parsed.
    #[error("invalid operation id: {0}")]
    InvalidOperationId(String),

    /// An entity kind name could not be parsed.
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),
}
