//! Repair command implementation.

use super::{open_queue, Keys};
use ledgersync_protocol::is_well_formed_id;
use std::path::Path;
use tracing::info;

/// Runs the repair command.
pub fn run(path: &Path, keys: &Keys, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Repairing queue in {:?}", path);
    let queue = open_queue(path, keys)?;

    let removed = if dry_run {
        queue
            .all()
            .into_iter()
            .filter(|op| !is_well_formed_id(op.operation.entity_id()))
            .collect()
    } else {
        queue.repair()
    };

    if removed.is_empty() {
        println!("✓ No malformed operations found");
        return Ok(());
    }

    let verb = if dry_run { "Would remove" } else { "Removed" };
    for op in &removed {
        println!(
            "{} {} {} {:?} ({})",
            verb,
            op.operation.kind(),
            op.operation.entity_kind(),
            op.operation.entity_id(),
            op.id
        );
    }
    if !dry_run {
        queue.persist()?;
    }
    println!("{} {} operation(s)", verb, removed.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_protocol::{EntityKind, Operation};

    #[test]
    fn dry_run_keeps_queue() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::default();
        {
            let queue = open_queue(dir.path(), &keys).unwrap();
            queue.enqueue(Operation::delete(EntityKind::Session, "temp-1"));
        }

        run(dir.path(), &keys, true).unwrap();
        assert_eq!(open_queue(dir.path(), &keys).unwrap().len(), 1);

        run(dir.path(), &keys, false).unwrap();
        assert!(open_queue(dir.path(), &keys).unwrap().is_empty());
    }
}
