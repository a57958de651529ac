use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use super::domain::BranchId;

/// Per-branch policy snapshot supplied by the configuration collaborator.
///
/// The engine treats a snapshot as a value: it is loaded once per request or
/// evaluation batch and never observed mid-mutation, so classification stays
/// deterministic even if branch configuration changes while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePolicy {
    pub min_visit_duration_minutes: i64,
    pub max_visit_duration_hours: i64,
    pub auto_punch_out_hours: i64,
    pub grace_period_minutes: i64,
    /// Branch-local clock offset from UTC, used only for calendar-date
    /// attribution of punch-ins.
    pub time_zone_offset_minutes: i32,
    pub require_biometric: bool,
    pub allow_manual_check_in: bool,
    pub send_notifications: bool,
}

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

impl AttendancePolicy {
    /// Validate the snapshot at load time. A policy with non-positive
    /// thresholds or an inverted min/max band would silently misclassify
    /// every visit, so it is rejected here instead.
    pub fn validated(self) -> Result<Self, PolicyError> {
        for (field, value) in [
            (
                "min_visit_duration_minutes",
                self.min_visit_duration_minutes,
            ),
            ("max_visit_duration_hours", self.max_visit_duration_hours),
            ("auto_punch_out_hours", self.auto_punch_out_hours),
        ] {
            if value <= 0 {
                return Err(PolicyError::NonPositiveThreshold { field, value });
            }
        }

        if self.grace_period_minutes < 0 {
            return Err(PolicyError::NonPositiveThreshold {
                field: "grace_period_minutes",
                value: self.grace_period_minutes,
            });
        }

        if self.time_zone_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(PolicyError::OffsetOutOfRange {
                minutes: self.time_zone_offset_minutes,
            });
        }

        if self.min_visit_duration_minutes > self.max_visit_duration_minutes() {
            return Err(PolicyError::MinExceedsMax {
                min_minutes: self.min_visit_duration_minutes,
                max_minutes: self.max_visit_duration_minutes(),
            });
        }

        Ok(self)
    }

    pub fn max_visit_duration_minutes(&self) -> i64 {
        self.max_visit_duration_hours * 60
    }

    /// Duration stamped onto auto-closed visits: the configured ceiling, not
    /// the wall-clock time at which the sweep noticed the record.
    pub fn auto_close_duration_minutes(&self) -> i64 {
        self.auto_punch_out_hours * 60
    }

    /// Minutes a visit may stay open before forced closure applies.
    pub fn auto_close_cutoff_minutes(&self) -> i64 {
        self.auto_close_duration_minutes() + self.grace_period_minutes
    }

    /// Manual check-ins require the branch toggle and are excluded entirely
    /// when the branch mandates biometric verification.
    pub fn manual_check_in_permitted(&self) -> bool {
        self.allow_manual_check_in && !self.require_biometric
    }

    pub fn branch_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.time_zone_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is representable"))
    }
}

/// Seam to the branch-configuration collaborator. Implementations return an
/// already-validated, immutable snapshot per branch.
pub trait PolicySource: Send + Sync {
    fn snapshot(&self, branch: &BranchId) -> Result<AttendancePolicy, PolicyError>;
}

/// Validation and lookup errors for policy snapshots.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("policy threshold {field} must be positive, found {value}")]
    NonPositiveThreshold { field: &'static str, value: i64 },
    #[error("minimum visit duration {min_minutes}m exceeds maximum {max_minutes}m")]
    MinExceedsMax { min_minutes: i64, max_minutes: i64 },
    #[error("time zone offset {minutes}m is not a representable UTC offset")]
    OffsetOutOfRange { minutes: i32 },
    #[error("no policy configured for branch {0:?}")]
    UnknownBranch(BranchId),
}
