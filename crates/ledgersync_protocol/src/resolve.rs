//! Conflict resolution strategies.

use crate::conflict::{changed_fields, ConflictRecord, ConflictType};
use crate::entity::{EntityKind, Record};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Policy for resolving a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Local copy wins.
    LocalWins,
    /// Remote copy wins.
    RemoteWins,
    /// The copy with the later modification time wins.
    #[default]
    LastModifiedWins,
    /// Field-level merge for kinds that define one.
    Merge,
    /// Never auto-resolve; the caller must collect input.
    Manual,
}

impl ResolutionStrategy {
    /// Returns true if this strategy can produce data without user input.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ResolutionStrategy::Manual)
    }
}

/// What the caller should do with both stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Write the local copy to both sides.
    UseLocal,
    /// Write the remote copy to both sides.
    UseRemote,
    /// Write the merged record to both sides.
    UseMerged,
    /// Remove the identity from both sides.
    Delete,
    /// Ask the user before writing anything.
    ManualRequired,
}

/// The decided outcome of one conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<T> {
    /// What to do.
    pub action: ResolutionAction,
    /// The winning or merged record; `None` for delete and manual.
    pub data: Option<T>,
    /// Fields a merge changed relative to the local copy.
    pub changed_fields_applied: Option<BTreeSet<String>>,
    /// Human-readable justification, for audit logs only.
    pub reason: String,
}

impl<T> Resolution<T> {
    fn new(action: ResolutionAction, data: Option<T>, reason: impl Into<String>) -> Self {
        Self {
            action,
            data,
            changed_fields_applied: None,
            reason: reason.into(),
        }
    }

    fn delete(reason: impl Into<String>) -> Self {
        Self::new(ResolutionAction::Delete, None, reason)
    }

    fn manual(reason: impl Into<String>) -> Self {
        Self::new(ResolutionAction::ManualRequired, None, reason)
    }
}

/// Resolves one conflict under `strategy`.
///
/// - `LocalWins` / `RemoteWins`: a delete-type conflict resolves to
///   `Delete`; otherwise the preferred side, falling back to the other
/// - `LastModifiedWins`: the strictly later timestamp wins; on missing or
///   equal timestamps, deletions win, then remote, then local
/// - `Merge`: the kind's merge when both sides are present, else
///   `LastModifiedWins`
/// - `Manual`: always `ManualRequired` with no data
pub fn resolve<T: Record>(conflict: &ConflictRecord<T>, strategy: ResolutionStrategy) -> Resolution<T> {
    match strategy {
        ResolutionStrategy::LocalWins => side_wins(conflict, Side::Local),
        ResolutionStrategy::RemoteWins => side_wins(conflict, Side::Remote),
        ResolutionStrategy::LastModifiedWins => last_modified_wins(conflict),
        ResolutionStrategy::Merge => merge(conflict),
        ResolutionStrategy::Manual => Resolution::manual("manual strategy selected"),
    }
}

#[derive(Clone, Copy)]
enum Side {
    Local,
    Remote,
}

fn take<T: Clone>(conflict: &ConflictRecord<T>, side: Side, reason: &str) -> Option<Resolution<T>> {
    match side {
        Side::Local => conflict
            .local
            .clone()
            .map(|data| Resolution::new(ResolutionAction::UseLocal, Some(data), reason)),
        Side::Remote => conflict
            .remote
            .clone()
            .map(|data| Resolution::new(ResolutionAction::UseRemote, Some(data), reason)),
    }
}

fn side_wins<T: Record>(conflict: &ConflictRecord<T>, preferred: Side) -> Resolution<T> {
    if conflict.conflict_type == ConflictType::Delete {
        return Resolution::delete("record missing remotely; deletion propagates");
    }

    let (fallback, reason, fallback_reason) = match preferred {
        Side::Local => (
            Side::Remote,
            "local version preferred",
            "local copy absent; using remote",
        ),
        Side::Remote => (
            Side::Local,
            "remote version preferred",
            "remote copy absent; using local",
        ),
    };

    take(conflict, preferred, reason)
        .or_else(|| take(conflict, fallback, fallback_reason))
        .unwrap_or_else(|| Resolution::manual("neither copy present"))
}

fn last_modified_wins<T: Record>(conflict: &ConflictRecord<T>) -> Resolution<T> {
    if let (Some(local_at), Some(remote_at)) =
        (conflict.local_modified_at, conflict.remote_modified_at)
    {
        let decided = if local_at > remote_at {
            take(conflict, Side::Local, "local modified more recently")
        } else if remote_at > local_at {
            take(conflict, Side::Remote, "remote modified more recently")
        } else {
            None
        };
        if let Some(resolution) = decided {
            return resolution;
        }
    }

    if conflict.conflict_type == ConflictType::Delete {
        return Resolution::delete("no usable timestamps; deletion assumed more recent");
    }

    take(conflict, Side::Remote, "no usable timestamps; remote is authoritative")
        .or_else(|| take(conflict, Side::Local, "no usable timestamps; only local present"))
        .unwrap_or_else(|| Resolution::manual("neither copy present"))
}

fn merge<T: Record>(conflict: &ConflictRecord<T>) -> Resolution<T> {
    let (Some(local), Some(remote)) = (&conflict.local, &conflict.remote) else {
        let mut resolution = last_modified_wins(conflict);
        resolution.reason = format!("merge needs both copies; {}", resolution.reason);
        return resolution;
    };

    match T::merge(local, remote) {
        Some(merged) => {
            let applied = changed_fields(local, &merged);
            Resolution {
                action: ResolutionAction::UseMerged,
                changed_fields_applied: Some(applied),
                data: Some(merged),
                reason: format!("merged {} fields", T::KIND),
            }
        }
        None => {
            let mut resolution = last_modified_wins(conflict);
            resolution.reason = format!("no merge rules for {}; {}", T::KIND, resolution.reason);
            resolution
        }
    }
}

/// Outcome of resolving many independent conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResolution<T> {
    /// One `(identity, resolution)` pair per input conflict, in input order.
    pub resolutions: Vec<(String, Resolution<T>)>,
    /// How many resolutions require user input.
    pub manual_required: usize,
}

impl<T> BatchResolution<T> {
    /// Returns true if any conflict needs user input.
    pub fn needs_attention(&self) -> bool {
        self.manual_required > 0
    }
}

/// Resolves every conflict with the same strategy.
///
/// Conflicts are independent; there is no cross-record coordination.
pub fn resolve_batch<T: Record>(
    conflicts: &[ConflictRecord<T>],
    strategy: ResolutionStrategy,
) -> BatchResolution<T> {
    let resolutions: Vec<(String, Resolution<T>)> = conflicts
        .iter()
        .map(|conflict| (conflict.id.clone(), resolve(conflict, strategy)))
        .collect();
    let manual_required = resolutions
        .iter()
        .filter(|(_, r)| r.action == ResolutionAction::ManualRequired)
        .count();

    BatchResolution {
        resolutions,
        manual_required,
    }
}

/// Resolver with a default strategy and per-kind overrides.
///
/// # Example
///
/// ```
/// use ledgersync_protocol::{ConflictResolver, EntityKind, ResolutionStrategy};
///
/// let resolver = ConflictResolver::new(ResolutionStrategy::Merge)
///     .with_strategy(EntityKind::Payment, ResolutionStrategy::Manual);
/// assert_eq!(resolver.strategy_for(EntityKind::Payment), ResolutionStrategy::Manual);
/// assert_eq!(resolver.strategy_for(EntityKind::Client), ResolutionStrategy::Merge);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    default_strategy: ResolutionStrategy,
    overrides: HashMap<EntityKind, ResolutionStrategy>,
}

impl ConflictResolver {
    /// Creates a resolver using `default_strategy` for every kind.
    pub fn new(default_strategy: ResolutionStrategy) -> Self {
        Self {
            default_strategy,
            overrides: HashMap::new(),
        }
    }

    /// Uses `strategy` for conflicts of `kind`.
    pub fn with_strategy(mut self, kind: EntityKind, strategy: ResolutionStrategy) -> Self {
        self.overrides.insert(kind, strategy);
        self
    }

    /// Returns the strategy applied to `kind`.
    pub fn strategy_for(&self, kind: EntityKind) -> ResolutionStrategy {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or(self.default_strategy)
    }

    /// Resolves one conflict with the strategy configured for its kind.
    pub fn resolve<T: Record>(&self, conflict: &ConflictRecord<T>) -> Resolution<T> {
        resolve(conflict, self.strategy_for(T::KIND))
    }

    /// Resolves many conflicts with the strategy configured for their kind.
    pub fn resolve_batch<T: Record>(&self, conflicts: &[ConflictRecord<T>]) -> BatchResolution<T> {
        resolve_batch(conflicts, self.strategy_for(T::KIND))
    }
}
