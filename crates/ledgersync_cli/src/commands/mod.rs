//! CLI command implementations.

pub mod clear;
pub mod inspect;
pub mod remove;
pub mod repair;
pub mod retry;

use ledgersync_engine::OperationQueue;
use ledgersync_protocol::DEFAULT_MAX_RETRIES;
use ledgersync_storage::FileCache;
use std::path::Path;

/// Cache keys the commands operate on.
#[derive(Debug, Clone)]
pub struct Keys {
    /// Key holding the queue.
    pub queue: String,
    /// Key holding the status record.
    pub status: String,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            queue: ledgersync_engine::DEFAULT_QUEUE_KEY.to_string(),
            status: ledgersync_engine::DEFAULT_STATUS_KEY.to_string(),
        }
    }
}

/// Opens the queue in an existing cache directory.
///
/// Fails if the directory is missing or another process holds the cache.
pub fn open_queue(
    path: &Path,
    keys: &Keys,
) -> Result<OperationQueue<FileCache>, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No cache directory at {:?}", path).into());
    }
    let cache = FileCache::open(path)?;
    Ok(OperationQueue::open(cache, keys.queue.clone(), DEFAULT_MAX_RETRIES)?)
}
