use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::domain::CloseReason;
use super::policy::PolicySource;
use super::repository::{VisitRepository, VisitStoreError};

/// Time-driven closer for visits whose punch-out was never captured.
///
/// A visit open longer than `auto_punch_out_hours` plus the grace period is
/// closed at the configured ceiling (`punch_in + auto_punch_out_hours`), not
/// at the wall-clock time the sweep happened to run, so duration statistics
/// stay policy-consistent regardless of tick granularity.
pub struct AutoCloseScheduler<R, P> {
    repository: Arc<R>,
    policies: Arc<P>,
}

/// Tally of one sweep. Deferred closures stay open and are retried on the
/// next tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub examined: usize,
    pub closed: usize,
    pub deferred: usize,
}

impl<R, P> AutoCloseScheduler<R, P>
where
    R: VisitRepository + Send + Sync + 'static,
    P: PolicySource + 'static,
{
    pub fn new(repository: Arc<R>, policies: Arc<P>) -> Self {
        Self {
            repository,
            policies,
        }
    }

    /// Run one pass over the open visits. Records are closed one at a time;
    /// no lock is held across the whole sweep, so punch ingestion is never
    /// starved. A record that was punched out between listing and closing is
    /// skipped silently.
    pub fn sweep(&self, now: DateTime<Utc>) -> SweepOutcome {
        let open = match self.repository.open_visits() {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "auto-close sweep could not list open visits");
                return SweepOutcome::default();
            }
        };

        let mut outcome = SweepOutcome::default();

        for record in open {
            outcome.examined += 1;

            let policy = match self.policies.snapshot(&record.branch_id) {
                Ok(policy) => policy,
                Err(err) => {
                    warn!(branch = %record.branch_id.0, error = %err, "skipping visit without a valid policy");
                    continue;
                }
            };

            let cutoff = Duration::minutes(policy.auto_close_cutoff_minutes());
            if now.signed_duration_since(record.punch_in) < cutoff {
                continue;
            }

            let punch_out = record.punch_in + Duration::hours(policy.auto_punch_out_hours);
            match self
                .repository
                .close_open(&record.key(), punch_out, CloseReason::Auto)
            {
                Ok(closed) => {
                    outcome.closed += 1;
                    info!(
                        member = %closed.member_id.0,
                        facility = %closed.facility_id.0,
                        minutes = closed.duration_minutes.unwrap_or_default(),
                        "visit auto-closed at policy ceiling"
                    );
                }
                Err(VisitStoreError::NotFound) => {
                    // Closed manually since the listing; nothing to retry.
                }
                Err(err) => {
                    outcome.deferred += 1;
                    warn!(
                        member = %record.member_id.0,
                        facility = %record.facility_id.0,
                        error = %err,
                        "auto-close persist failed, retrying next tick"
                    );
                }
            }
        }

        outcome
    }

    /// Spawn the periodic sweep on the current runtime. The tick period is a
    /// deployment choice carried by server configuration.
    pub fn spawn(self: Arc<Self>, period: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let outcome = self.sweep(Utc::now());
                if outcome.closed > 0 || outcome.deferred > 0 {
                    info!(
                        closed = outcome.closed,
                        deferred = outcome.deferred,
                        "auto-close sweep finished"
                    );
                }
            }
        })
    }
}
