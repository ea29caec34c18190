//! Clear command implementation.

use super::{open_queue, Keys};
use std::path::Path;
use tracing::info;

/// Runs the clear command.
pub fn run(path: &Path, keys: &Keys, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Clearing queue in {:?}", path);
    let queue = open_queue(path, keys)?;
    let counts = queue.counts();

    if counts.total() == 0 {
        println!("Queue is already empty");
        return Ok(());
    }

    if !force {
        return Err(format!(
            "Refusing to drop {} operation(s) ({} pending, {} failed) without --force",
            counts.total(),
            counts.pending,
            counts.failed
        )
        .into());
    }

    let removed = queue.clear();
    queue.persist()?;
    println!("Removed {} operation(s)", removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_protocol::{EntityKind, Operation};

    #[test]
    fn requires_force() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::default();
        {
            let queue = open_queue(dir.path(), &keys).unwrap();
            queue.enqueue(Operation::delete(EntityKind::Client, "c1"));
        }

        assert!(run(dir.path(), &keys, false).is_err());
        assert_eq!(open_queue(dir.path(), &keys).unwrap().len(), 1);

        run(dir.path(), &keys, true).unwrap();
        assert!(open_queue(dir.path(), &keys).unwrap().is_empty());
    }
}
