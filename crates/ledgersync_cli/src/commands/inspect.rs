//! Inspect command implementation.

use super::{open_queue, Keys};
use chrono::{DateTime, Utc};
use ledgersync_engine::PersistedStatus;
use ledgersync_protocol::{OperationStatus, QueuedOperation};
use serde::Serialize;
use std::path::Path;

/// Queue inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Cache directory.
    pub path: String,
    /// End of the last successful sync pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Operations waiting for a pass.
    pub pending: usize,
    /// Operations interrupted mid-apply.
    pub processing: usize,
    /// Operations applied but not yet removed.
    pub completed: usize,
    /// Operations out of retries.
    pub failed: usize,
    /// Listed operations, in queue order.
    pub operations: Vec<OperationRow>,
}

/// One queued operation.
#[derive(Debug, Serialize)]
pub struct OperationRow {
    /// Operation id.
    pub id: String,
    /// create, update or delete.
    pub kind: String,
    /// Entity kind.
    pub entity: String,
    /// Entity identity.
    pub entity_id: String,
    /// Processing state.
    pub status: String,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempt cap.
    pub max_retries: u32,
    /// Enqueue time.
    pub enqueued_at: DateTime<Utc>,
    /// Last failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Earliest next attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl From<&QueuedOperation> for OperationRow {
    fn from(op: &QueuedOperation) -> Self {
        Self {
            id: op.id.to_string(),
            kind: op.operation.kind().to_string(),
            entity: op.operation.entity_kind().to_string(),
            entity_id: op.operation.entity_id().to_string(),
            status: op.status.to_string(),
            retry_count: op.retry_count,
            max_retries: op.max_retries,
            enqueued_at: op.enqueued_at,
            last_error: op.last_error.clone(),
            next_attempt_at: op.next_attempt_at,
        }
    }
}

fn parse_status(status: &str) -> Result<OperationStatus, Box<dyn std::error::Error>> {
    match status {
        "pending" => Ok(OperationStatus::Pending),
        "processing" => Ok(OperationStatus::Processing),
        "completed" => Ok(OperationStatus::Completed),
        "failed" => Ok(OperationStatus::Failed),
        other => Err(format!("Unknown operation status: {other}").into()),
    }
}

/// Collects the inspection result.
pub fn collect(
    path: &Path,
    keys: &Keys,
    status: Option<&str>,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let filter = status.map(parse_status).transpose()?;
    let queue = open_queue(path, keys)?;
    let persisted = PersistedStatus::load(queue.cache(), &keys.status)?;
    let counts = queue.counts();

    let operations = queue
        .all()
        .iter()
        .filter(|op| filter.map_or(true, |s| op.status == s))
        .map(OperationRow::from)
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        last_sync_at: persisted.last_sync_at,
        pending: counts.pending,
        processing: counts.processing,
        completed: counts.completed,
        failed: counts.failed,
        operations,
    })
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    keys: &Keys,
    status: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path, keys, status)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Cache: {}", result.path);
    match result.last_sync_at {
        Some(at) => println!("Last sync: {}", at.to_rfc3339()),
        None => println!("Last sync: never"),
    }
    println!();
    println!("Pending:    {}", result.pending);
    println!("Processing: {}", result.processing);
    println!("Completed:  {}", result.completed);
    println!("Failed:     {}", result.failed);

    if result.operations.is_empty() {
        return;
    }

    println!();
    println!(
        "{:<36}  {:<6}  {:<8}  {:<36}  {:<10}  {:>5}",
        "ID", "KIND", "ENTITY", "ENTITY ID", "STATUS", "TRIES"
    );
    for row in &result.operations {
        println!(
            "{:<36}  {:<6}  {:<8}  {:<36}  {:<10}  {:>2}/{:<2}",
            row.id, row.kind, row.entity, row.entity_id, row.status, row.retry_count, row.max_retries
        );
        if let Some(error) = &row.last_error {
            println!("    last error: {}", error);
        }
    }
}
