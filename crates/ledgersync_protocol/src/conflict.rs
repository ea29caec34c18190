//! Conflict detection between a local and a remote collection.

use crate::entity::{EntityKind, Record};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

/// How a divergent identity is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Present only remotely; the local cache is missing it.
    Create,
    /// Present on both sides with different contents.
    Update,
    /// Present only locally; the remote lost it or never received it.
    Delete,
}

/// A divergence between the local and remote copy of one identity.
///
/// Only constructed for identities whose copies differ; identical records
/// never produce a conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictRecord<T> {
    /// Shared identity.
    pub id: String,
    /// Local copy, if present.
    pub local: Option<T>,
    /// Remote copy, if present.
    pub remote: Option<T>,
    /// Classification derived from which sides are present.
    pub conflict_type: ConflictType,
    /// Local modification time, if tracked.
    pub local_modified_at: Option<DateTime<Utc>>,
    /// Remote modification time, if tracked.
    pub remote_modified_at: Option<DateTime<Utc>>,
    /// Top-level fields that differ; empty unless both sides are present.
    pub changed_fields: BTreeSet<String>,
}

impl<T: Record> ConflictRecord<T> {
    /// Builds a conflict from the two sides of one identity.
    ///
    /// Returns `None` when both sides are absent or equal.
    pub fn between(id: impl Into<String>, local: Option<T>, remote: Option<T>) -> Option<Self> {
        let conflict_type = match (&local, &remote) {
            (None, None) => return None,
            (Some(l), Some(r)) if l == r => return None,
            (Some(_), Some(_)) => ConflictType::Update,
            (Some(_), None) => ConflictType::Delete,
            (None, Some(_)) => ConflictType::Create,
        };

        let changed_fields = match (&local, &remote) {
            (Some(l), Some(r)) => changed_fields(l, r),
            _ => BTreeSet::new(),
        };

        Some(Self {
            id: id.into(),
            local_modified_at: local.as_ref().and_then(Record::modified_at),
            remote_modified_at: remote.as_ref().and_then(Record::modified_at),
            local,
            remote,
            conflict_type,
            changed_fields,
        })
    }

    /// Returns the entity kind of the conflicting records.
    pub fn entity_kind(&self) -> EntityKind {
        T::KIND
    }

    /// Returns true if both copies are present.
    pub fn is_two_sided(&self) -> bool {
        self.local.is_some() && self.remote.is_some()
    }
}

/// Diffs two collections keyed by [`Record::id`].
///
/// See [`detect_by`].
pub fn detect<T: Record>(local: &[T], remote: &[T]) -> Vec<ConflictRecord<T>> {
    detect_by(local, remote, |record| record.id().to_string())
}

/// Diffs two collections keyed by `identity_of`.
///
/// Returns exactly one conflict per identity whose copies differ,
/// including identities present on only one side. Runs in O(n): two map
/// builds and one pass over the identity union.
///
/// Conflicts are ordered by first appearance in `local`, followed by
/// remote-only identities in `remote` order. If an identity appears more
/// than once within one collection, the last occurrence is used.
pub fn detect_by<T, F>(local: &[T], remote: &[T], identity_of: F) -> Vec<ConflictRecord<T>>
where
    T: Record,
    F: Fn(&T) -> String,
{
    let mut order: Vec<String> = Vec::with_capacity(local.len().max(remote.len()));
    let mut seen: HashSet<String> = HashSet::with_capacity(local.len() + remote.len());

    let mut local_by_id: HashMap<String, &T> = HashMap::with_capacity(local.len());
    for record in local {
        let id = identity_of(record);
        if seen.insert(id.clone()) {
            order.push(id.clone());
        }
        local_by_id.insert(id, record);
    }

    let mut remote_by_id: HashMap<String, &T> = HashMap::with_capacity(remote.len());
    for record in remote {
        let id = identity_of(record);
        if seen.insert(id.clone()) {
            order.push(id.clone());
        }
        remote_by_id.insert(id, record);
    }

    order
        .into_iter()
        .filter_map(|id| {
            let local = local_by_id.get(&id).map(|r| (*r).clone());
            let remote = remote_by_id.get(&id).map(|r| (*r).clone());
            ConflictRecord::between(id, local, remote)
        })
        .collect()
}

/// Returns the top-level field names whose values differ between `a` and `b`.
///
/// A field present on one side only counts as changed. Values that do not
/// serialize to maps produce an empty set.
pub fn changed_fields<T: Serialize>(a: &T, b: &T) -> BTreeSet<String> {
    let (Ok(Value::Object(a)), Ok(Value::Object(b))) =
        (serde_json::to_value(a), serde_json::to_value(b))
    else {
        return BTreeSet::new();
    };

    a.keys()
        .chain(b.keys())
        .filter(|key| a.get(key.as_str()) != b.get(key.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Client, Session, SessionStatus};
    use chrono::TimeZone;

    #[test]
    fn identical_collections_have_no_conflicts() {
        let clients = vec![Client::new("c1", "Ana", 40), Client::new("c2", "Bo", 50)];
        assert!(detect(&clients, &clients.clone()).is_empty());
    }

    #[test]
    fn classifies_each_divergence() {
        let local = vec![Client::new("c1", "Ana", 40), Client::new("c2", "Bo", 50)];
        let remote = vec![Client::new("c1", "Ana", 45), Client::new("c3", "Cy", 30)];

        let conflicts = detect(&local, &remote);
        assert_eq!(conflicts.len(), 3);

        assert_eq!(conflicts[0].id, "c1");
        assert_eq!(conflicts[0].conflict_type, ConflictType::Update);
        assert_eq!(
            conflicts[0].changed_fields,
            BTreeSet::from(["rate".to_string()])
        );

        assert_eq!(conflicts[1].id, "c2");
        assert_eq!(conflicts[1].conflict_type, ConflictType::Delete);
        assert!(conflicts[1].remote.is_none());
        assert!(conflicts[1].changed_fields.is_empty());

        assert_eq!(conflicts[2].id, "c3");
        assert_eq!(conflicts[2].conflict_type, ConflictType::Create);
        assert!(conflicts[2].local.is_none());
    }

    #[test]
    fn changed_fields_counts_one_sided_fields() {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        let local = Session::new("s1", "c1", start);
        let mut remote = local.clone();
        remote.amount = Some(5000);
        remote.status = SessionStatus::Unpaid;

        let fields = changed_fields(&local, &remote);
        assert_eq!(
            fields,
            BTreeSet::from(["amount".to_string(), "status".to_string()])
        );
    }

    #[test]
    fn carries_modification_times() {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();
        let mut local = Client::new("c1", "Ana", 40);
        local.updated_at = Some(at);
        let remote = Client::new("c1", "Ana", 41);

        let conflict = ConflictRecord::between("c1", Some(local), Some(remote)).unwrap();
        assert_eq!(conflict.local_modified_at, Some(at));
        assert_eq!(conflict.remote_modified_at, None);
        assert_eq!(conflict.entity_kind(), EntityKind::Client);
        assert!(conflict.is_two_sided());
    }

    #[test]
    fn custom_identity_function() {
        let local = vec![Client::new("C1", "Ana", 40)];
        let remote = vec![Client::new("c1", "Ana", 40)];
        // Case-insensitive identity still sees a difference in the id field.
        let conflicts = detect_by(&local, &remote, |c| c.id.to_lowercase());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::Update);
        assert_eq!(conflicts[0].changed_fields, BTreeSet::from(["id".to_string()]));
    }
}
