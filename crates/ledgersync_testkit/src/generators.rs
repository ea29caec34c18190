//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records and collections that keep
//! identities unique within one collection.

use crate::fixtures::minutes_after_epoch;
use ledgersync_protocol::{Client, Session, SessionStatus};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for short record identities.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f0-9]{1,4}").expect("Invalid regex")
}

/// Strategy for any session status.
pub fn session_status_strategy() -> impl Strategy<Value = SessionStatus> {
    prop_oneof![
        Just(SessionStatus::Active),
        Just(SessionStatus::Unpaid),
        Just(SessionStatus::Requested),
        Just(SessionStatus::Paid),
    ]
}

/// Strategy for clients with a given id.
pub fn client_strategy(id: String) -> impl Strategy<Value = Client> {
    (
        prop::string::string_regex("[A-Za-z ]{0,8}").expect("Invalid regex"),
        0i64..20_000,
        prop::option::of(0i64..10_000),
    )
        .prop_map(move |(name, rate, updated)| {
            let mut client = Client::new(id.clone(), name, rate);
            client.updated_at = updated.map(minutes_after_epoch);
            client
        })
}

/// Strategy for sessions with a given id.
pub fn session_strategy(id: String) -> impl Strategy<Value = Session> {
    (
        0i64..1_000,
        prop::option::of(1i64..240),
        prop::option::of(0i64..50_000),
        session_status_strategy(),
        prop::option::of(0i64..10_000),
    )
        .prop_map(move |(start, duration, amount, status, updated)| {
            let mut session = Session::new(id.clone(), "c1", minutes_after_epoch(start));
            session.end_time = duration.map(|d| minutes_after_epoch(start + d));
            session.duration_minutes = duration;
            session.amount = amount;
            session.status = status;
            session.updated_at = updated.map(minutes_after_epoch);
            session
        })
}

/// Strategy for a client collection with unique identities.
pub fn client_collection_strategy(max_len: usize) -> impl Strategy<Value = Vec<Client>> {
    prop::collection::btree_set(id_strategy(), 0..max_len)
        .prop_flat_map(|ids| {
            ids.into_iter()
                .map(client_strategy)
                .collect::<Vec<_>>()
        })
}

/// Strategy for a pair of client collections that partially overlap.
///
/// Shared identities are sometimes identical on both sides and sometimes
/// perturbed, so every conflict type is exercised.
pub fn overlapping_clients_strategy(
    max_len: usize,
) -> impl Strategy<Value = (Vec<Client>, Vec<Client>)> {
    (
        client_collection_strategy(max_len),
        client_collection_strategy(max_len),
        prop::collection::vec(any::<bool>(), max_len),
    )
        .prop_map(|(local, mut remote, same)| {
            let remote_ids: BTreeMap<String, usize> = remote
                .iter()
                .enumerate()
                .map(|(i, c)| (c.id.clone(), i))
                .collect();
            for (i, client) in local.iter().enumerate() {
                if same.get(i).copied().unwrap_or(false) {
                    match remote_ids.get(&client.id) {
                        Some(&idx) => remote[idx] = client.clone(),
                        None => remote.push(client.clone()),
                    }
                }
            }
            (local, remote)
        })
}
