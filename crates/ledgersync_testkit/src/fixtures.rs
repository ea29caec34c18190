//! Record fixtures.
//!
//! All timestamps are derived from [`epoch`] so tests stay deterministic.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ledgersync_protocol::{Activity, Client, Payment, Session, SessionStatus};

/// Fixed reference time used by every fixture.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Reference time shifted by `minutes`.
pub fn minutes_after_epoch(minutes: i64) -> DateTime<Utc> {
    epoch() + Duration::minutes(minutes)
}

/// A fresh well-formed identity.
pub fn uuid_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A client with no contact details.
pub fn client(id: &str, name: &str, rate: i64) -> Client {
    Client::new(id, name, rate)
}

/// A client modified at `minutes` after the epoch.
pub fn client_at(id: &str, name: &str, rate: i64, minutes: i64) -> Client {
    let mut record = Client::new(id, name, rate);
    record.updated_at = Some(minutes_after_epoch(minutes));
    record
}

/// An in-progress session starting at the epoch.
pub fn session(id: &str, client_id: &str, status: SessionStatus) -> Session {
    let mut record = Session::new(id, client_id, epoch());
    record.status = status;
    record
}

/// A finished session lasting `minutes` and billed `amount`.
pub fn completed_session(id: &str, client_id: &str, minutes: i64, amount: i64) -> Session {
    let mut record = Session::new(id, client_id, epoch());
    record.end_time = Some(minutes_after_epoch(minutes));
    record.duration_minutes = Some(minutes);
    record.amount = Some(amount);
    record.status = SessionStatus::Unpaid;
    record
}

/// A payment covering `session_ids`.
pub fn payment(id: &str, client_id: &str, session_ids: &[&str], amount: i64) -> Payment {
    Payment::new(
        id,
        client_id,
        session_ids.iter().map(|s| (*s).to_string()).collect(),
        amount,
    )
}

/// An activity log entry at the epoch.
pub fn activity(id: &str, description: &str) -> Activity {
    Activity {
        id: id.to_string(),
        client_id: None,
        description: description.to_string(),
        occurred_at: epoch(),
        updated_at: None,
    }
}
