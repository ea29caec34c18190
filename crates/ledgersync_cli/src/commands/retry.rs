//! Retry command implementation.

use super::{open_queue, Keys};
use std::path::Path;
use tracing::info;

/// Runs the retry command.
///
/// Only resets state; the operations are delivered by the next sync pass
/// of the application owning the cache.
pub fn run(path: &Path, keys: &Keys) -> Result<(), Box<dyn std::error::Error>> {
    info!("Resetting failed operations in {:?}", path);
    let queue = open_queue(path, keys)?;
    let reset = queue.reset_failed();
    queue.persist()?;
    println!("Reset {} failed operation(s) to pending", reset);
    Ok(())
}
