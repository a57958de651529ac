use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for members already resolved by the biometric/identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

/// Identifier wrapper for a facility (gym floor, pool, court) inside a branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacilityId(pub String);

/// Identifier wrapper for the branch whose policy governs a visit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchId(pub String);

/// Direction of a single attendance signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchDirection {
    In,
    Out,
}

impl PunchDirection {
    pub const fn label(self) -> &'static str {
        match self {
            PunchDirection::In => "in",
            PunchDirection::Out => "out",
        }
    }
}

/// How the member was identified at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Biometric,
    Manual,
}

impl VerificationMethod {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationMethod::Biometric => "biometric",
            VerificationMethod::Manual => "manual",
        }
    }
}

/// Immutable punch fact as delivered by the ingestion boundary. Retained for audit,
/// never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunchEvent {
    pub member_id: MemberId,
    pub facility_id: FacilityId,
    pub branch_id: BranchId,
    pub direction: PunchDirection,
    pub timestamp: DateTime<Utc>,
    pub method: VerificationMethod,
}

impl PunchEvent {
    pub fn key(&self) -> VisitKey {
        VisitKey {
            member_id: self.member_id.clone(),
            facility_id: self.facility_id.clone(),
        }
    }
}

/// Composite key addressing the single open-visit slot for a member at a facility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitKey {
    pub member_id: MemberId,
    pub facility_id: FacilityId,
}

/// Why (or whether) a visit record has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Pending,
    Manual,
    Auto,
}

impl CloseReason {
    pub const fn label(self) -> &'static str {
        match self {
            CloseReason::Pending => "pending",
            CloseReason::Manual => "manual",
            CloseReason::Auto => "auto",
        }
    }
}

/// Derived in/out pairing for one facility visit. Mutable only until closed;
/// closed records are append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub member_id: MemberId,
    pub facility_id: FacilityId,
    pub branch_id: BranchId,
    /// Branch-local date of the punch-in. Visits spanning midnight keep this date.
    pub date: NaiveDate,
    pub punch_in: DateTime<Utc>,
    pub punch_out: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub biometric_verified: bool,
    pub close_reason: CloseReason,
}

impl VisitRecord {
    /// Build the open record for a punch-in event. `date` is the branch-local
    /// calendar date resolved by the caller.
    pub fn open(event: &PunchEvent, date: NaiveDate) -> Self {
        Self {
            member_id: event.member_id.clone(),
            facility_id: event.facility_id.clone(),
            branch_id: event.branch_id.clone(),
            date,
            punch_in: event.timestamp,
            punch_out: None,
            duration_minutes: None,
            biometric_verified: event.method == VerificationMethod::Biometric,
            close_reason: CloseReason::Pending,
        }
    }

    pub fn is_open(&self) -> bool {
        self.punch_out.is_none()
    }

    pub fn key(&self) -> VisitKey {
        VisitKey {
            member_id: self.member_id.clone(),
            facility_id: self.facility_id.clone(),
        }
    }

    /// Close the record, deriving the duration as whole elapsed minutes
    /// (floored). Shared by manual punch-outs and the auto-closure sweep so
    /// every storage implementation applies the same arithmetic.
    pub fn closed(mut self, punch_out: DateTime<Utc>, reason: CloseReason) -> Self {
        let elapsed = punch_out.signed_duration_since(self.punch_in);
        self.punch_out = Some(punch_out);
        self.duration_minutes = Some(elapsed.num_minutes());
        self.close_reason = reason;
        self
    }

    pub const fn status_label(&self) -> &'static str {
        if self.punch_out.is_none() {
            "active"
        } else {
            "closed"
        }
    }
}
