use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::classify::{classify_record, AnomalyClassification};
use super::domain::{BranchId, FacilityId, VisitRecord};
use super::policy::AttendancePolicy;
use super::repository::MemberDirectory;

/// Aggregate statistics over a filtered set of visit records. Recomputed on
/// demand; never the source of truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub total_visits: usize,
    pub unique_members: usize,
    pub avg_duration_minutes: i64,
    pub anomaly_count: usize,
}

impl AttendanceSummary {
    /// Derive the summary from raw records. Open visits count toward
    /// `total_visits` and `unique_members` but are excluded from the average
    /// denominator and from anomaly counting: a visit with no duration yet is
    /// neither short nor extended.
    pub fn from_records(records: &[VisitRecord], policy: &AttendancePolicy) -> Self {
        let total_visits = records.len();

        let unique_members = records
            .iter()
            .map(|record| &record.member_id)
            .collect::<HashSet<_>>()
            .len();

        let closed_durations: Vec<i64> = records
            .iter()
            .filter_map(|record| record.duration_minutes)
            .collect();
        let avg_duration_minutes = if closed_durations.is_empty() {
            0
        } else {
            let sum: i64 = closed_durations.iter().sum();
            (sum as f64 / closed_durations.len() as f64).round() as i64
        };

        let anomaly_count = records
            .iter()
            .filter_map(|record| classify_record(record, policy))
            .filter(|classification| classification.is_anomaly())
            .count();

        Self {
            total_visits,
            unique_members,
            avg_duration_minutes,
            anomaly_count,
        }
    }
}

/// Which path produced a summary: the upstream precomputed one, or the
/// engine's own derivation over raw records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Upstream,
    Derived,
}

/// Prefer an upstream precomputed summary when one is available, otherwise
/// fall back to deriving from raw records. Both paths must agree for the same
/// record set; the fallback is not a degraded approximation.
pub fn resolve_summary(
    precomputed: Option<AttendanceSummary>,
    records: &[VisitRecord],
    policy: &AttendancePolicy,
) -> (AttendanceSummary, SummarySource) {
    match precomputed {
        Some(summary) => (summary, SummarySource::Upstream),
        None => (
            AttendanceSummary::from_records(records, policy),
            SummarySource::Derived,
        ),
    }
}

/// Reporting filter: branch scope plus optional date window, facility,
/// free-text member search, and the anomalies-only view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitQuery {
    pub branch_id: BranchId,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub facility_id: Option<FacilityId>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub anomalies_only: bool,
}

impl VisitQuery {
    pub fn new(branch_id: BranchId) -> Self {
        Self {
            branch_id,
            from: None,
            to: None,
            facility_id: None,
            search: None,
            anomalies_only: false,
        }
    }

    /// Apply the filter over a ledger snapshot. The member directory resolves
    /// free-text searches; a member missing from the roster still matches on
    /// their raw identifier.
    pub fn select(
        &self,
        records: &[VisitRecord],
        policy: &AttendancePolicy,
        directory: &dyn MemberDirectory,
    ) -> Vec<VisitRecord> {
        records
            .iter()
            .filter(|record| self.matches(record, policy, directory))
            .cloned()
            .collect()
    }

    fn matches(
        &self,
        record: &VisitRecord,
        policy: &AttendancePolicy,
        directory: &dyn MemberDirectory,
    ) -> bool {
        if record.branch_id != self.branch_id {
            return false;
        }

        if let Some(from) = self.from {
            if record.date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.date > to {
                return false;
            }
        }

        if let Some(facility) = &self.facility_id {
            if &record.facility_id != facility {
                return false;
            }
        }

        if let Some(needle) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            let needle = needle.trim();
            let profile_match = directory
                .profile(&record.member_id)
                .map(|profile| profile.matches(needle))
                .unwrap_or(false);
            let id_match = record
                .member_id
                .0
                .to_lowercase()
                .contains(&needle.to_lowercase());
            if !profile_match && !id_match {
                return false;
            }
        }

        if self.anomalies_only {
            return classify_record(record, policy)
                .map(AnomalyClassification::is_anomaly)
                .unwrap_or(false);
        }

        true
    }
}

/// Serializable projection of a visit record for the reporting collaborator,
/// with stable string labels and the derived classification attached.
#[derive(Debug, Clone, Serialize)]
pub struct VisitRecordView {
    pub member_id: String,
    pub facility_id: String,
    pub branch_id: String,
    pub date: NaiveDate,
    pub punch_in: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub punch_out: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    pub biometric_verified: bool,
    pub close_reason: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<&'static str>,
}

impl VisitRecordView {
    pub fn from_record(record: &VisitRecord, policy: &AttendancePolicy) -> Self {
        Self {
            member_id: record.member_id.0.clone(),
            facility_id: record.facility_id.0.clone(),
            branch_id: record.branch_id.0.clone(),
            date: record.date,
            punch_in: record.punch_in,
            punch_out: record.punch_out,
            duration_minutes: record.duration_minutes,
            biometric_verified: record.biometric_verified,
            close_reason: record.close_reason.label(),
            status: record.status_label(),
            classification: classify_record(record, policy).map(AnomalyClassification::label),
        }
    }
}
