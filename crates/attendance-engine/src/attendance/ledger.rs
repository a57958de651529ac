use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{
    BranchId, CloseReason, PunchDirection, PunchEvent, VerificationMethod, VisitRecord,
};
use super::policy::{AttendancePolicy, PolicyError, PolicySource};
use super::repository::{
    AttendanceNotification, NotificationKind, NotificationPublisher, NotifyError, VisitRepository,
    VisitStoreError,
};

/// Ingestion service composing the storage, notification, and policy seams.
///
/// The ledger owns the visit lifecycle: it creates open records on punch-in,
/// closes them on punch-out, and enforces the at-most-one-open-visit
/// invariant through the repository's conflict semantics. It never deletes.
pub struct VisitLedger<R, N, P> {
    repository: Arc<R>,
    notifier: Arc<N>,
    policies: Arc<P>,
}

impl<R, N, P> VisitLedger<R, N, P>
where
    R: VisitRepository + 'static,
    N: NotificationPublisher + 'static,
    P: PolicySource + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, policies: Arc<P>) -> Self {
        Self {
            repository,
            notifier,
            policies,
        }
    }

    /// Apply one punch event. Punch-ins open a visit; punch-outs close the
    /// matching open visit and derive its duration.
    pub fn record_punch(&self, event: PunchEvent) -> Result<VisitRecord, PunchError> {
        let policy = self.policies.snapshot(&event.branch_id)?;

        match event.direction {
            PunchDirection::In => self.punch_in(event, &policy),
            PunchDirection::Out => self.punch_out(event, &policy),
        }
    }

    /// Full ledger snapshot for reporting and aggregation.
    pub fn visits(&self) -> Result<Vec<VisitRecord>, PunchError> {
        Ok(self.repository.history()?)
    }

    /// Currently open visits.
    pub fn open_visits(&self) -> Result<Vec<VisitRecord>, PunchError> {
        Ok(self.repository.open_visits()?)
    }

    pub fn policy_for(&self, branch: &BranchId) -> Result<AttendancePolicy, PolicyError> {
        self.policies.snapshot(branch)
    }

    fn punch_in(
        &self,
        event: PunchEvent,
        policy: &AttendancePolicy,
    ) -> Result<VisitRecord, PunchError> {
        if event.method == VerificationMethod::Manual && !policy.manual_check_in_permitted() {
            return Err(PunchError::ManualCheckInDisabled);
        }

        // Midnight-spanning visits stay attributed to the punch-in date.
        let date = event
            .timestamp
            .with_timezone(&policy.branch_offset())
            .date_naive();
        let record = VisitRecord::open(&event, date);

        let stored = self.repository.insert_open(record).map_err(|err| match err {
            VisitStoreError::Conflict => PunchError::DuplicatePunchIn,
            other => PunchError::Storage(other),
        })?;

        info!(
            member = %stored.member_id.0,
            facility = %stored.facility_id.0,
            date = %stored.date,
            "visit opened"
        );

        self.notify(policy, NotificationKind::CheckIn, &stored)?;
        Ok(stored)
    }

    fn punch_out(
        &self,
        event: PunchEvent,
        policy: &AttendancePolicy,
    ) -> Result<VisitRecord, PunchError> {
        let closed = self
            .repository
            .close_open(&event.key(), event.timestamp, CloseReason::Manual)
            .map_err(|err| match err {
                VisitStoreError::NotFound => {
                    // Likely hardware or clock skew; surfaced as non-fatal.
                    warn!(
                        member = %event.member_id.0,
                        facility = %event.facility_id.0,
                        timestamp = %event.timestamp,
                        "punch-out without an open visit"
                    );
                    PunchError::NoOpenVisit
                }
                other => PunchError::Storage(other),
            })?;

        info!(
            member = %closed.member_id.0,
            facility = %closed.facility_id.0,
            minutes = closed.duration_minutes.unwrap_or_default(),
            "visit closed"
        );

        self.notify(policy, NotificationKind::CheckOut, &closed)?;
        Ok(closed)
    }

    fn notify(
        &self,
        policy: &AttendancePolicy,
        kind: NotificationKind,
        record: &VisitRecord,
    ) -> Result<(), NotifyError> {
        if !policy.send_notifications {
            return Ok(());
        }

        let timestamp = match kind {
            NotificationKind::CheckIn => record.punch_in,
            NotificationKind::CheckOut => record.punch_out.unwrap_or(record.punch_in),
        };

        self.notifier.publish(AttendanceNotification {
            kind,
            member_id: record.member_id.clone(),
            facility_id: record.facility_id.clone(),
            timestamp,
            duration_minutes: record.duration_minutes,
        })
    }
}

/// Error raised by the punch ingestion path. Classification and aggregation
/// are pure; every failure mode of the engine funnels through here or the
/// scheduler's persistence step.
#[derive(Debug, thiserror::Error)]
pub enum PunchError {
    #[error("member already has an open visit at this facility")]
    DuplicatePunchIn,
    #[error("no open visit matches this punch-out")]
    NoOpenVisit,
    #[error("manual check-in is not permitted for this branch")]
    ManualCheckInDisabled,
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Storage(#[from] VisitStoreError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}
