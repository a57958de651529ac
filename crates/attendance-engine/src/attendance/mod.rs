//! Attendance processing: punch ingestion, visit lifecycle, policy-driven
//! anomaly classification, automatic closure, and aggregate reporting.

mod classify;
pub mod domain;
pub mod import;
pub mod ledger;
pub mod policy;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod summary;

#[cfg(test)]
mod tests;

pub use classify::{classify, classify_record, AnomalyClassification};
pub use domain::{
    BranchId, CloseReason, FacilityId, MemberId, PunchDirection, PunchEvent, VerificationMethod,
    VisitKey, VisitRecord,
};
pub use import::{DeviceLogImportError, DeviceLogImporter, ImportReport};
pub use ledger::{PunchError, VisitLedger};
pub use policy::{AttendancePolicy, PolicyError, PolicySource};
pub use repository::{
    AttendanceNotification, MemberDirectory, MemberProfile, NotificationKind,
    NotificationPublisher, NotifyError, VisitRepository, VisitStoreError,
};
pub use router::{attendance_router, SummaryRequest, SummaryResponse};
pub use scheduler::{AutoCloseScheduler, SweepOutcome};
pub use summary::{
    resolve_summary, AttendanceSummary, SummarySource, VisitQuery, VisitRecordView,
};
