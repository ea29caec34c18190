//! Entity-specific field merges.
//!
//! Each function takes two divergent copies of the same identity and
//! builds one record from them field by field.

use crate::entity::{Client, Payment, Session};

/// Merges two client copies.
///
/// - name: remote if non-blank, else local
/// - rate: the higher of the two; reconciliation never lowers a rate
/// - contact fields: remote if set, else local
pub(crate) fn merge_client(local: &Client, remote: &Client) -> Client {
    let name = if remote.name.trim().is_empty() {
        local.name.clone()
    } else {
        remote.name.clone()
    };

    Client {
        id: local.id.clone(),
        name,
        rate: local.rate.max(remote.rate),
        email: remote.email.clone().or_else(|| local.email.clone()),
        phone: remote.phone.clone().or_else(|| local.phone.clone()),
        notes: remote.notes.clone().or_else(|| local.notes.clone()),
        updated_at: local.updated_at.max(remote.updated_at),
    }
}

/// Merges two session copies.
///
/// - start time and client: local (the side that opened the session)
/// - end time, duration, amount: whichever side has them, remote first
/// - status: the more advanced of the two
pub(crate) fn merge_session(local: &Session, remote: &Session) -> Session {
    Session {
        id: local.id.clone(),
        client_id: local.client_id.clone(),
        start_time: local.start_time,
        end_time: remote.end_time.or(local.end_time),
        duration_minutes: remote.duration_minutes.or(local.duration_minutes),
        amount: remote.amount.or(local.amount),
        status: local.status.max(remote.status),
        updated_at: local.updated_at.max(remote.updated_at),
    }
}

/// Merges two payment copies.
///
/// - session ids: union, local order first
/// - amount and method: remote
/// - paid at: the later of the two
pub(crate) fn merge_payment(local: &Payment, remote: &Payment) -> Payment {
    let mut session_ids = local.session_ids.clone();
    for id in &remote.session_ids {
        if !session_ids.contains(id) {
            session_ids.push(id.clone());
        }
    }

    Payment {
        id: local.id.clone(),
        client_id: remote.client_id.clone(),
        session_ids,
        amount: remote.amount,
        method: remote.method,
        paid_at: local.paid_at.max(remote.paid_at),
        updated_at: local.updated_at.max(remote.updated_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{PaymentMethod, SessionStatus};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn client_prefers_remote_name_and_higher_rate() {
        let local = Client::new("c1", "", 40);
        let remote = Client::new("c1", "Ana", 35);
        let merged = merge_client(&local, &remote);
        assert_eq!(merged.name, "Ana");
        assert_eq!(merged.rate, 40);
    }

    #[test]
    fn client_keeps_local_name_when_remote_blank() {
        let local = Client::new("c1", "Ana Souza", 40);
        let remote = Client::new("c1", "  ", 60);
        let merged = merge_client(&local, &remote);
        assert_eq!(merged.name, "Ana Souza");
        assert_eq!(merged.rate, 60);
    }

    #[test]
    fn session_completed_side_outranks_in_progress() {
        let start = Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap();
        let local = Session::new("s1", "c1", start);
        let mut remote = Session::new("s1", "c1", start + Duration::minutes(5));
        remote.end_time = Some(start + Duration::minutes(50));
        remote.duration_minutes = Some(50);
        remote.amount = Some(4000);
        remote.status = SessionStatus::Unpaid;

        let merged = merge_session(&local, &remote);
        assert_eq!(merged.start_time, start);
        assert_eq!(merged.end_time, remote.end_time);
        assert_eq!(merged.duration_minutes, Some(50));
        assert_eq!(merged.amount, Some(4000));
        assert_eq!(merged.status, SessionStatus::Unpaid);
    }

    #[test]
    fn session_status_never_regresses() {
        let start = Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap();
        let mut local = Session::new("s1", "c1", start);
        local.status = SessionStatus::Paid;
        let mut remote = local.clone();
        remote.status = SessionStatus::Requested;
        assert_eq!(merge_session(&local, &remote).status, SessionStatus::Paid);
        assert_eq!(merge_session(&remote, &local).status, SessionStatus::Paid);
    }

    #[test]
    fn payment_unions_sessions_and_trusts_remote_amount() {
        let early = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let mut local = Payment::new("p1", "c1", vec!["s1".into(), "s2".into()], 8000);
        local.paid_at = Some(early + Duration::hours(2));
        let mut remote = Payment::new("p1", "c1", vec!["s2".into(), "s3".into()], 12000);
        remote.method = PaymentMethod::BankTransfer;
        remote.paid_at = Some(early);

        let merged = merge_payment(&local, &remote);
        assert_eq!(merged.session_ids, vec!["s1", "s2", "s3"]);
        assert_eq!(merged.amount, 12000);
        assert_eq!(merged.method, PaymentMethod::BankTransfer);
        assert_eq!(merged.paid_at, local.paid_at);
    }
}
