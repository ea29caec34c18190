//! Remove command implementation.

use super::{open_queue, Keys};
use ledgersync_protocol::OperationId;
use std::path::Path;

/// Runs the remove command.
pub fn run(path: &Path, keys: &Keys, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id: OperationId = id.parse()?;
    let queue = open_queue(path, keys)?;
    match queue.remove(id) {
        Some(op) => {
            queue.persist()?;
            println!(
                "Removed {} {} {} ({})",
                op.operation.kind(),
                op.operation.entity_kind(),
                op.operation.entity_id(),
                op.status
            );
            Ok(())
        }
        None => Err(format!("No operation {} in queue", id).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_protocol::{EntityKind, Operation};

    #[test]
    fn removes_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Keys::default();
        let id = {
            let queue = open_queue(dir.path(), &keys).unwrap();
            queue.enqueue(Operation::delete(EntityKind::Session, "s1"))
        };

        run(dir.path(), &keys, &id.to_string()).unwrap();
        assert!(run(dir.path(), &keys, &id.to_string()).is_err());
        assert!(open_queue(dir.path(), &keys).unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), &Keys::default(), "not-an-id").is_err());
    }
}
