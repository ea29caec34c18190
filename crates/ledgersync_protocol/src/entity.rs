//! Typed records for the synchronized entity kinds.
//!
//! Monetary values (`rate`, `amount`) are integers in minor currency units.

use crate::error::{ProtocolError, ProtocolResult};
use crate::merge;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four record types the sync core knows how to synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A person the provider works with.
    Client,
    /// A single appointment with a client.
    Session,
    /// Money received, covering one or more sessions.
    Payment,
    /// A free-form activity log entry.
    Activity,
}

impl EntityKind {
    /// All kinds, in dependency order (clients before the records that reference them).
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Client,
        EntityKind::Session,
        EntityKind::Payment,
        EntityKind::Activity,
    ];

    /// Returns the lowercase name used in logs and persisted state.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Session => "session",
            EntityKind::Payment => "payment",
            EntityKind::Activity => "activity",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownEntityKind(s.to_string()))
    }
}

/// Returns true if `id` is a well-formed entity identity (a UUID).
///
/// Used by queue repair to drop entries poisoned with placeholder ids.
pub fn is_well_formed_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

/// Common behavior of every synchronized record type.
pub trait Record: Clone + PartialEq + Serialize {
    /// The entity kind of this record type.
    const KIND: EntityKind;

    /// Returns the identity shared by the local and remote copies.
    fn id(&self) -> &str;

    /// Returns the last modification time, if tracked.
    fn modified_at(&self) -> Option<DateTime<Utc>>;

    /// Field-level merge of two divergent copies.
    ///
    /// Returns `None` when the kind has no merge rules; the resolver then
    /// falls back to last-modified-wins.
    fn merge(_local: &Self, _remote: &Self) -> Option<Self> {
        None
    }

    /// Wraps the record in the tagged union.
    fn into_entity(self) -> EntityRecord;
}

/// A client of the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Identity.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Hourly rate in minor currency units.
    pub rate: i64,
    /// Contact email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Client {
    /// Creates a client with no contact details.
    pub fn new(id: impl Into<String>, name: impl Into<String>, rate: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rate,
            email: None,
            phone: None,
            notes: None,
            updated_at: None,
        }
    }
}

/// Payment lifecycle of a session.
///
/// The declaration order is the monotonic progression used by merges:
/// `Active < Unpaid < Requested < Paid`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session in progress.
    #[default]
    Active,
    /// Finished, not yet billed.
    Unpaid,
    /// Payment requested from the client.
    Requested,
    /// Settled.
    Paid,
}

/// A session with a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Identity.
    pub id: String,
    /// Owning client.
    pub client_id: String,
    /// When the session started.
    pub start_time: DateTime<Utc>,
    /// When the session ended; `None` while in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Billable duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    /// Billed amount in minor currency units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Payment lifecycle status.
    #[serde(default)]
    pub status: SessionStatus,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates an in-progress session.
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            start_time,
            end_time: None,
            duration_minutes: None,
            amount: None,
            status: SessionStatus::Active,
            updated_at: None,
        }
    }

    /// Returns true once the session has an end time.
    pub fn is_completed(&self) -> bool {
        self.end_time.is_some()
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash.
    #[default]
    Cash,
    /// Card.
    Card,
    /// Bank transfer.
    BankTransfer,
    /// Anything else.
    Other,
}

/// A payment covering one or more sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Identity.
    pub id: String,
    /// Paying client.
    pub client_id: String,
    /// Sessions covered by this payment.
    #[serde(default)]
    pub session_ids: Vec<String>,
    /// Amount in minor currency units.
    pub amount: i64,
    /// Payment method.
    #[serde(default)]
    pub method: PaymentMethod,
    /// When the payment was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Creates a payment for the given sessions.
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        session_ids: Vec<String>,
        amount: i64,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            session_ids,
            amount,
            method: PaymentMethod::Cash,
            paid_at: None,
            updated_at: None,
        }
    }
}

/// An activity log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Identity.
    pub id: String,
    /// Related client, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Short description of what happened.
    pub description: String,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn id(&self) -> &str {
        &self.id
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn merge(local: &Self, remote: &Self) -> Option<Self> {
        Some(merge::merge_client(local, remote))
    }

    fn into_entity(self) -> EntityRecord {
        EntityRecord::Client(self)
    }
}

impl Record for Session {
    const KIND: EntityKind = EntityKind::Session;

    fn id(&self) -> &str {
        &self.id
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn merge(local: &Self, remote: &Self) -> Option<Self> {
        Some(merge::merge_session(local, remote))
    }

    fn into_entity(self) -> EntityRecord {
        EntityRecord::Session(self)
    }
}

impl Record for Payment {
    const KIND: EntityKind = EntityKind::Payment;

    fn id(&self) -> &str {
        &self.id
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn merge(local: &Self, remote: &Self) -> Option<Self> {
        Some(merge::merge_payment(local, remote))
    }

    fn into_entity(self) -> EntityRecord {
        EntityRecord::Payment(self)
    }
}

impl Record for Activity {
    const KIND: EntityKind = EntityKind::Activity;

    fn id(&self) -> &str {
        &self.id
    }

    fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(Some(self.occurred_at))
    }

    fn into_entity(self) -> EntityRecord {
        EntityRecord::Activity(self)
    }
}

/// A record of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRecord {
    /// A client record.
    Client(Client),
    /// A session record.
    Session(Session),
    /// A payment record.
    Payment(Payment),
    /// An activity record.
    Activity(Activity),
}

impl EntityRecord {
    /// Returns the kind of the wrapped record.
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRecord::Client(_) => EntityKind::Client,
            EntityRecord::Session(_) => EntityKind::Session,
            EntityRecord::Payment(_) => EntityKind::Payment,
            EntityRecord::Activity(_) => EntityKind::Activity,
        }
    }

    /// Returns the identity of the wrapped record.
    pub fn id(&self) -> &str {
        match self {
            EntityRecord::Client(r) => &r.id,
            EntityRecord::Session(r) => &r.id,
            EntityRecord::Payment(r) => &r.id,
            EntityRecord::Activity(r) => &r.id,
        }
    }

    /// Returns a reference naming this record.
    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.kind(), self.id())
    }
}

macro_rules! impl_record_conversions {
    ($ty:ident) => {
        impl From<$ty> for EntityRecord {
            fn from(record: $ty) -> Self {
                EntityRecord::$ty(record)
            }
        }

        impl TryFrom<EntityRecord> for $ty {
            type Error = ProtocolError;

            fn try_from(record: EntityRecord) -> ProtocolResult<Self> {
                match record {
                    EntityRecord::$ty(inner) => Ok(inner),
                    other => Err(ProtocolError::KindMismatch {
                        expected: <$ty as Record>::KIND,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

impl_record_conversions!(Client);
impl_record_conversions!(Session);
impl_record_conversions!(Payment);
impl_record_conversions!(Activity);

/// Names one entity without carrying its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity identity.
    pub id: String,
}

impl EntityRef {
    /// Creates a reference.
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_names_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("invoice".parse::<EntityKind>().is_err());
    }

    #[test]
    fn session_status_progression() {
        assert!(SessionStatus::Active < SessionStatus::Unpaid);
        assert!(SessionStatus::Unpaid < SessionStatus::Requested);
        assert!(SessionStatus::Requested < SessionStatus::Paid);
    }

    #[test]
    fn well_formed_ids() {
        assert!(is_well_formed_id("7f9c2a4e-1b3d-4c5e-8f6a-0b1c2d3e4f5a"));
        assert!(!is_well_formed_id("temp-123"));
        assert!(!is_well_formed_id(""));
    }

    #[test]
    fn typed_extraction_checks_kind() {
        let record = EntityRecord::from(Client::new("c1", "Ana", 40));
        assert_eq!(record.kind(), EntityKind::Client);
        assert_eq!(record.id(), "c1");

        let err = Session::try_from(record.clone()).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::KindMismatch {
                expected: EntityKind::Session,
                found: EntityKind::Client
            }
        );
        assert_eq!(Client::try_from(record).unwrap().name, "Ana");
    }

    #[test]
    fn activity_falls_back_to_occurred_at() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let activity = Activity {
            id: "a1".into(),
            client_id: None,
            description: "called".into(),
            occurred_at: at,
            updated_at: None,
        };
        assert_eq!(activity.modified_at(), Some(at));
    }

    #[test]
    fn entity_ref_display() {
        let r = EntityRef::new(EntityKind::Payment, "p1");
        assert_eq!(r.to_string(), "payment:p1");
    }
}
