//! # ledgersync testkit
//!
//! Test utilities for ledgersync.
//!
//! This crate provides:
//! - Record fixtures with fixed timestamps
//! - Property-based test generators using proptest
//! - Caches for failure and restart scenarios
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ledgersync_testkit::prelude::*;
//!
//! #[test]
//! fn detects_rate_change() {
//!     let local = vec![client("c1", "Ana", 40)];
//!     let remote = vec![client("c1", "Ana", 45)];
//!     assert_eq!(ledgersync_protocol::detect(&local, &remote).len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod caches;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::caches::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use caches::*;
pub use fixtures::*;
pub use generators::*;
