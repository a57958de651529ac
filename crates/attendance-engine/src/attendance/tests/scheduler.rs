use super::common::*;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::attendance::domain::{CloseReason, PunchDirection, VisitKey, VisitRecord};
use crate::attendance::repository::{VisitRepository, VisitStoreError};
use crate::attendance::AutoCloseScheduler;

fn scheduler_over(
    repository: Arc<MemoryRepository>,
) -> AutoCloseScheduler<MemoryRepository, StaticPolicies> {
    let policies = Arc::new(StaticPolicies::default().with_policy(BRANCH, policy()));
    AutoCloseScheduler::new(repository, policies)
}

#[test]
fn young_visits_are_left_open() {
    let (ledger, repository, _) = build_ledger();
    ledger
        .record_punch(punch("m-001", PunchDirection::In, at(9, 0)))
        .expect("punch-in accepted");

    let scheduler = scheduler_over(repository.clone());
    let outcome = scheduler.sweep(at(9, 0) + Duration::hours(2));

    assert_eq!(outcome.examined, 1);
    assert_eq!(outcome.closed, 0);
    assert_eq!(repository.open_visits().expect("list").len(), 1);
}

#[test]
fn grace_period_defers_forced_closure() {
    let (ledger, repository, _) = build_ledger();
    let opened = at(9, 0);
    ledger
        .record_punch(punch("m-001", PunchDirection::In, opened))
        .expect("punch-in accepted");

    let scheduler = scheduler_over(repository.clone());

    // One minute shy of the 6h ceiling plus 30m grace.
    let outcome = scheduler.sweep(opened + Duration::hours(6) + Duration::minutes(29));
    assert_eq!(outcome.closed, 0);

    let outcome = scheduler.sweep(opened + Duration::hours(6) + Duration::minutes(30));
    assert_eq!(outcome.closed, 1);
}

#[test]
fn forced_closure_lands_on_the_policy_ceiling() {
    let (ledger, repository, _) = build_ledger();
    let opened = at(9, 0);
    ledger
        .record_punch(punch("m-001", PunchDirection::In, opened))
        .expect("punch-in accepted");

    let scheduler = scheduler_over(repository.clone());
    let discovered_at = opened + Duration::hours(9) + Duration::minutes(17);
    let outcome = scheduler.sweep(discovered_at);

    assert_eq!(outcome.closed, 1);
    let history = repository.history().expect("history");
    let record = &history[0];
    assert_eq!(record.punch_out, Some(opened + Duration::hours(6)));
    assert_eq!(record.duration_minutes, Some(360));
    assert_eq!(record.close_reason, CloseReason::Auto);
}

#[test]
fn sweep_is_idempotent_once_closed() {
    let (ledger, repository, _) = build_ledger();
    let opened = at(9, 0);
    ledger
        .record_punch(punch("m-001", PunchDirection::In, opened))
        .expect("punch-in accepted");

    let scheduler = scheduler_over(repository.clone());
    let late = opened + Duration::hours(7);
    assert_eq!(scheduler.sweep(late).closed, 1);

    let again = scheduler.sweep(late + Duration::minutes(5));
    assert_eq!(again.examined, 0);
    assert_eq!(again.closed, 0);
}

/// Fails the first `failures` close attempts, then delegates to the inner
/// repository, modeling a transient persistence outage.
struct FlakyRepository {
    inner: MemoryRepository,
    failures: AtomicUsize,
}

impl FlakyRepository {
    fn new(inner: MemoryRepository, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }
}

impl VisitRepository for FlakyRepository {
    fn insert_open(&self, record: VisitRecord) -> Result<VisitRecord, VisitStoreError> {
        self.inner.insert_open(record)
    }

    fn close_open(
        &self,
        key: &VisitKey,
        punch_out: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<VisitRecord, VisitStoreError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Err(VisitStoreError::Unavailable("write failed".to_string()));
        }
        self.inner.close_open(key, punch_out, reason)
    }

    fn open_visits(&self) -> Result<Vec<VisitRecord>, VisitStoreError> {
        self.inner.open_visits()
    }

    fn history(&self) -> Result<Vec<VisitRecord>, VisitStoreError> {
        self.inner.history()
    }
}

#[test]
fn failed_persistence_is_retried_next_tick() {
    let memory = MemoryRepository::default();
    let flaky = Arc::new(FlakyRepository::new(memory.clone(), 1));
    let policies = Arc::new(StaticPolicies::default().with_policy(BRANCH, policy()));

    let notifier = Arc::new(MemoryNotifier::default());
    let ledger = crate::attendance::VisitLedger::new(flaky.clone(), notifier, policies.clone());
    let opened = at(9, 0);
    ledger
        .record_punch(punch("m-001", PunchDirection::In, opened))
        .expect("punch-in accepted");

    let scheduler = AutoCloseScheduler::new(flaky, policies);
    let late = opened + Duration::hours(7);

    let first = scheduler.sweep(late);
    assert_eq!(first.deferred, 1);
    assert_eq!(first.closed, 0);
    assert_eq!(memory.open_visits().expect("list").len(), 1, "record must stay open");

    let second = scheduler.sweep(late + Duration::minutes(5));
    assert_eq!(second.closed, 1);
    assert_eq!(second.deferred, 0);
    assert!(memory.open_visits().expect("list").is_empty());
}

#[test]
fn visits_without_a_policy_are_skipped() {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let policies = Arc::new(
        StaticPolicies::default()
            .with_policy(BRANCH, policy())
            .with_policy("uptown", policy()),
    );
    let ledger =
        crate::attendance::VisitLedger::new(repository.clone(), notifier, policies);

    let opened = at(9, 0);
    ledger
        .record_punch(punch("m-001", PunchDirection::In, opened))
        .expect("punch-in accepted");
    let mut orphan = punch("m-002", PunchDirection::In, opened);
    orphan.branch_id = crate::attendance::BranchId("uptown".to_string());
    ledger.record_punch(orphan).expect("punch-in accepted");

    // Scheduler sees a policy source missing the second branch.
    let partial = Arc::new(StaticPolicies::default().with_policy(BRANCH, policy()));
    let scheduler = AutoCloseScheduler::new(repository.clone(), partial);
    let outcome = scheduler.sweep(opened + Duration::hours(7));

    assert_eq!(outcome.examined, 2);
    assert_eq!(outcome.closed, 1);
    assert_eq!(repository.open_visits().expect("list").len(), 1);
}
