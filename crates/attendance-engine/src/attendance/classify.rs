use serde::{Deserialize, Serialize};

use super::domain::VisitRecord;
use super::policy::AttendancePolicy;

/// Duration band of a closed visit relative to branch policy. Derived on
/// read, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyClassification {
    Short,
    Normal,
    Extended,
}

impl AnomalyClassification {
    pub const fn label(self) -> &'static str {
        match self {
            AnomalyClassification::Short => "short",
            AnomalyClassification::Normal => "normal",
            AnomalyClassification::Extended => "extended",
        }
    }

    pub const fn is_anomaly(self) -> bool {
        !matches!(self, AnomalyClassification::Normal)
    }
}

/// Classify a closed visit's duration against the policy thresholds.
///
/// Both comparisons are strict: a visit exactly at the minimum or exactly at
/// the maximum band is normal.
pub fn classify(duration_minutes: i64, policy: &AttendancePolicy) -> AnomalyClassification {
    if duration_minutes < policy.min_visit_duration_minutes {
        AnomalyClassification::Short
    } else if duration_minutes > policy.max_visit_duration_minutes() {
        AnomalyClassification::Extended
    } else {
        AnomalyClassification::Normal
    }
}

/// Classification lifted over a record: open visits have no duration yet and
/// therefore no band.
pub fn classify_record(
    record: &VisitRecord,
    policy: &AttendancePolicy,
) -> Option<AnomalyClassification> {
    record
        .duration_minutes
        .map(|minutes| classify(minutes, policy))
}
