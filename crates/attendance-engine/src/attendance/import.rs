//! Replays biometric terminal export logs into the visit ledger.
//!
//! Access-control terminals buffer punches locally and export them as CSV
//! when the network link returns. The importer parses those rows tolerantly,
//! replays them in timestamp order, and reports how many were applied versus
//! rejected (duplicates and orphan punch-outs are expected in device replays
//! and are not failures).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::warn;

use super::domain::{
    BranchId, FacilityId, MemberId, PunchDirection, PunchEvent, VerificationMethod,
};
use super::ledger::{PunchError, VisitLedger};
use super::policy::PolicySource;
use super::repository::{NotificationPublisher, VisitRepository};

#[derive(Debug)]
pub enum DeviceLogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row { line: usize, detail: String },
    Punch(PunchError),
}

impl std::fmt::Display for DeviceLogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceLogImportError::Io(err) => write!(f, "failed to read device export: {}", err),
            DeviceLogImportError::Csv(err) => write!(f, "invalid device CSV data: {}", err),
            DeviceLogImportError::Row { line, detail } => {
                write!(f, "invalid device export row {}: {}", line, detail)
            }
            DeviceLogImportError::Punch(err) => {
                write!(f, "could not apply device punches to the ledger: {}", err)
            }
        }
    }
}

impl std::error::Error for DeviceLogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceLogImportError::Io(err) => Some(err),
            DeviceLogImportError::Csv(err) => Some(err),
            DeviceLogImportError::Row { .. } => None,
            DeviceLogImportError::Punch(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for DeviceLogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for DeviceLogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Outcome of one export replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub applied: usize,
    pub rejected: usize,
}

pub struct DeviceLogImporter;

impl DeviceLogImporter {
    pub fn from_path<Pa, R, N, P>(
        path: Pa,
        ledger: &VisitLedger<R, N, P>,
    ) -> Result<ImportReport, DeviceLogImportError>
    where
        Pa: AsRef<Path>,
        R: VisitRepository + 'static,
        N: NotificationPublisher + 'static,
        P: PolicySource + 'static,
    {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, ledger)
    }

    pub fn from_reader<Rd, R, N, P>(
        reader: Rd,
        ledger: &VisitLedger<R, N, P>,
    ) -> Result<ImportReport, DeviceLogImportError>
    where
        Rd: Read,
        R: VisitRepository + 'static,
        N: NotificationPublisher + 'static,
        P: PolicySource + 'static,
    {
        let mut events = parse_events(reader)?;
        // Devices flush out of order after an offline spell; per-key ordering
        // is what the ledger invariant requires, a global sort satisfies it.
        events.sort_by_key(|event| event.timestamp);

        let mut report = ImportReport::default();
        for event in events {
            match ledger.record_punch(event) {
                Ok(_) => report.applied += 1,
                Err(
                    err @ (PunchError::DuplicatePunchIn
                    | PunchError::NoOpenVisit
                    | PunchError::ManualCheckInDisabled),
                ) => {
                    report.rejected += 1;
                    warn!(error = %err, "device punch rejected during replay");
                }
                Err(other) => return Err(DeviceLogImportError::Punch(other)),
            }
        }

        Ok(report)
    }
}

fn parse_events<R: Read>(reader: R) -> Result<Vec<PunchEvent>, DeviceLogImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut events = Vec::new();

    for (index, record) in csv_reader.deserialize::<DeviceRow>().enumerate() {
        // Header occupies line 1.
        let line = index + 2;
        let row = record?;
        events.push(row.into_event(line)?);
    }

    Ok(events)
}

#[derive(Debug, Deserialize)]
struct DeviceRow {
    #[serde(rename = "Member ID")]
    member_id: String,
    #[serde(rename = "Facility")]
    facility: String,
    #[serde(rename = "Branch")]
    branch: String,
    #[serde(rename = "Direction")]
    direction: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Method", default, deserialize_with = "empty_string_as_none")]
    method: Option<String>,
}

impl DeviceRow {
    fn into_event(self, line: usize) -> Result<PunchEvent, DeviceLogImportError> {
        if self.member_id.is_empty() {
            return Err(DeviceLogImportError::Row {
                line,
                detail: "missing member id".to_string(),
            });
        }

        let direction = match self.direction.trim().to_ascii_lowercase().as_str() {
            "in" => PunchDirection::In,
            "out" => PunchDirection::Out,
            other => {
                return Err(DeviceLogImportError::Row {
                    line,
                    detail: format!("unknown direction '{other}'"),
                })
            }
        };

        // Terminals without a keypad omit the method column entirely.
        let method = match self.method.as_deref().map(str::to_ascii_lowercase) {
            None => VerificationMethod::Biometric,
            Some(value) if value == "biometric" => VerificationMethod::Biometric,
            Some(value) if value == "manual" => VerificationMethod::Manual,
            Some(other) => {
                return Err(DeviceLogImportError::Row {
                    line,
                    detail: format!("unknown verification method '{other}'"),
                })
            }
        };

        let timestamp = parse_timestamp(&self.timestamp).ok_or_else(|| {
            DeviceLogImportError::Row {
                line,
                detail: format!("unparseable timestamp '{}'", self.timestamp),
            }
        })?;

        Ok(PunchEvent {
            member_id: MemberId(self.member_id),
            facility_id: FacilityId(self.facility),
            branch_id: BranchId(self.branch),
            direction,
            timestamp,
            method,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Older firmware writes branch-naive local time; treated as UTC and
    // corrected by the branch offset only for date attribution.
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }

    None
}
