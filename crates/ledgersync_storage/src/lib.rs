//! # ledgersync storage
//!
//! Local persistent cache abstraction for ledgersync.
//!
//! This crate is the lowest layer of the sync stack. A cache is an
//! **opaque key-value byte store**: it never interprets the values it
//! holds. The sync engine keeps its durable operation queue and its small
//! status record under two well-known keys.
//!
//! ## Design Principles
//!
//! - Caches are simple byte stores (get, set, remove)
//! - No knowledge of queue formats or entity shapes
//! - Must be `Send + Sync` so one handle can be shared by the engine
//!   and its background tasks
//!
//! ## Available Caches
//!
//! - [`InMemoryCache`] - For testing and ephemeral state
//! - [`FileCache`] - One file per key inside a locked directory
//!
//! ## Example
//!
//! ```rust
//! use ledgersync_storage::{InMemoryCache, LocalCache};
//!
//! let cache = InMemoryCache::new();
//! cache.set("greeting", b"hello").unwrap();
//! assert_eq!(cache.get("greeting").unwrap(), Some(b"hello".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod file;
mod memory;

pub use cache::{validate_key, LocalCache};
pub use error::{StorageError, StorageResult};
pub use file::FileCache;
pub use memory::InMemoryCache;
