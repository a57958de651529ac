use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CloseReason, FacilityId, MemberId, VisitKey, VisitRecord};

/// Storage abstraction over the visit ledger so the ingestion service and
/// scheduler can be exercised in isolation.
///
/// Implementations must serialize writes per `VisitKey`: the open-visit index
/// is the compare-and-swap guard that keeps two concurrent punch-ins from
/// both succeeding. Records are never deleted, only closed.
pub trait VisitRepository: Send + Sync {
    /// Insert a new open record. Fails with `Conflict` when the key already
    /// has an open visit; the existing record must be left untouched.
    fn insert_open(&self, record: VisitRecord) -> Result<VisitRecord, VisitStoreError>;

    /// Atomically close the open record for `key` via [`VisitRecord::closed`].
    /// Fails with `NotFound` when no open visit exists for the key.
    fn close_open(
        &self,
        key: &VisitKey,
        punch_out: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<VisitRecord, VisitStoreError>;

    /// Snapshot of currently open visits, for the auto-closure sweep.
    fn open_visits(&self) -> Result<Vec<VisitRecord>, VisitStoreError>;

    /// Snapshot of the full ledger (open and closed), for reporting. A
    /// slightly stale read is acceptable here; the open/closed invariant is
    /// enforced only through the write methods above.
    fn history(&self) -> Result<Vec<VisitRecord>, VisitStoreError>;
}

/// Error enumeration for ledger storage failures.
#[derive(Debug, thiserror::Error)]
pub enum VisitStoreError {
    #[error("an open visit already exists for this member and facility")]
    Conflict,
    #[error("no open visit found for this member and facility")]
    NotFound,
    #[error("ledger storage unavailable: {0}")]
    Unavailable(String),
}

/// Outbound seam for check-in/check-out messages. The engine only emits the
/// event; delivery belongs to the notification collaborator.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: AttendanceNotification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CheckIn,
    CheckOut,
}

/// Payload handed to the notification collaborator on punch events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceNotification {
    pub kind: NotificationKind,
    pub member_id: MemberId,
    pub facility_id: FacilityId,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Read-only lookup into the member roster, used by reporting to resolve
/// free-text searches over member name and email.
pub trait MemberDirectory: Send + Sync {
    fn profile(&self, member: &MemberId) -> Option<MemberProfile>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    pub member_id: MemberId,
    pub full_name: String,
    pub email: String,
}

impl MemberProfile {
    /// Case-insensitive substring match over name and email.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.full_name.to_lowercase().contains(&needle)
            || self.email.to_lowercase().contains(&needle)
    }
}
