use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::attendance::domain::{
    BranchId, CloseReason, FacilityId, MemberId, PunchDirection, PunchEvent, VerificationMethod,
    VisitKey, VisitRecord,
};
use crate::attendance::policy::{AttendancePolicy, PolicyError, PolicySource};
use crate::attendance::repository::{
    AttendanceNotification, MemberDirectory, MemberProfile, NotificationPublisher, NotifyError,
    VisitRepository, VisitStoreError,
};
use crate::attendance::{attendance_router, VisitLedger};

pub(super) const BRANCH: &str = "downtown";
pub(super) const FACILITY: &str = "gym-floor";

pub(super) fn policy() -> AttendancePolicy {
    AttendancePolicy {
        min_visit_duration_minutes: 15,
        max_visit_duration_hours: 4,
        auto_punch_out_hours: 6,
        grace_period_minutes: 30,
        time_zone_offset_minutes: 0,
        require_biometric: false,
        allow_manual_check_in: true,
        send_notifications: true,
    }
    .validated()
    .expect("fixture policy is valid")
}

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0)
        .single()
        .expect("valid fixture timestamp")
}

pub(super) fn punch(
    member: &str,
    direction: PunchDirection,
    timestamp: DateTime<Utc>,
) -> PunchEvent {
    PunchEvent {
        member_id: MemberId(member.to_string()),
        facility_id: FacilityId(FACILITY.to_string()),
        branch_id: BranchId(BRANCH.to_string()),
        direction,
        timestamp,
        method: VerificationMethod::Biometric,
    }
}

pub(super) fn closed_visit(member: &str, date: NaiveDate, duration_minutes: i64) -> VisitRecord {
    let punch_in = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid fixture timestamp");
    let event = PunchEvent {
        member_id: MemberId(member.to_string()),
        facility_id: FacilityId(FACILITY.to_string()),
        branch_id: BranchId(BRANCH.to_string()),
        direction: PunchDirection::In,
        timestamp: punch_in,
        method: VerificationMethod::Biometric,
    };
    VisitRecord::open(&event, date).closed(
        punch_in + chrono::Duration::minutes(duration_minutes),
        CloseReason::Manual,
    )
}

#[derive(Default)]
struct LedgerState {
    records: Vec<VisitRecord>,
    open_index: HashMap<VisitKey, usize>,
}

/// Arena of records plus an open-visit index keyed by member and facility;
/// the index is the duplicate punch-in guard.
#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    state: Arc<Mutex<LedgerState>>,
}

impl VisitRepository for MemoryRepository {
    fn insert_open(&self, record: VisitRecord) -> Result<VisitRecord, VisitStoreError> {
        let mut state = self.state.lock().expect("ledger mutex poisoned");
        if state.open_index.contains_key(&record.key()) {
            return Err(VisitStoreError::Conflict);
        }
        let index = state.records.len();
        state.open_index.insert(record.key(), index);
        state.records.push(record.clone());
        Ok(record)
    }

    fn close_open(
        &self,
        key: &VisitKey,
        punch_out: DateTime<Utc>,
        reason: CloseReason,
    ) -> Result<VisitRecord, VisitStoreError> {
        let mut state = self.state.lock().expect("ledger mutex poisoned");
        let index = state.open_index.remove(key).ok_or(VisitStoreError::NotFound)?;
        let closed = state.records[index].clone().closed(punch_out, reason);
        state.records[index] = closed.clone();
        Ok(closed)
    }

    fn open_visits(&self) -> Result<Vec<VisitRecord>, VisitStoreError> {
        let state = self.state.lock().expect("ledger mutex poisoned");
        Ok(state
            .records
            .iter()
            .filter(|record| record.is_open())
            .cloned()
            .collect())
    }

    fn history(&self) -> Result<Vec<VisitRecord>, VisitStoreError> {
        let state = self.state.lock().expect("ledger mutex poisoned");
        Ok(state.records.clone())
    }
}

pub(super) struct UnavailableRepository;

impl VisitRepository for UnavailableRepository {
    fn insert_open(&self, _record: VisitRecord) -> Result<VisitRecord, VisitStoreError> {
        Err(VisitStoreError::Unavailable("database offline".to_string()))
    }

    fn close_open(
        &self,
        _key: &VisitKey,
        _punch_out: DateTime<Utc>,
        _reason: CloseReason,
    ) -> Result<VisitRecord, VisitStoreError> {
        Err(VisitStoreError::Unavailable("database offline".to_string()))
    }

    fn open_visits(&self) -> Result<Vec<VisitRecord>, VisitStoreError> {
        Err(VisitStoreError::Unavailable("database offline".to_string()))
    }

    fn history(&self) -> Result<Vec<VisitRecord>, VisitStoreError> {
        Err(VisitStoreError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<AttendanceNotification>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<AttendanceNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, notification: AttendanceNotification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct StaticPolicies {
    branches: HashMap<BranchId, AttendancePolicy>,
}

impl StaticPolicies {
    pub(super) fn with_policy(mut self, branch: &str, policy: AttendancePolicy) -> Self {
        self.branches.insert(BranchId(branch.to_string()), policy);
        self
    }
}

impl PolicySource for StaticPolicies {
    fn snapshot(&self, branch: &BranchId) -> Result<AttendancePolicy, PolicyError> {
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownBranch(branch.clone()))
    }
}

#[derive(Default, Clone)]
pub(super) struct StaticDirectory {
    members: HashMap<MemberId, MemberProfile>,
}

impl StaticDirectory {
    pub(super) fn with_member(mut self, id: &str, name: &str, email: &str) -> Self {
        let member_id = MemberId(id.to_string());
        self.members.insert(
            member_id.clone(),
            MemberProfile {
                member_id,
                full_name: name.to_string(),
                email: email.to_string(),
            },
        );
        self
    }
}

impl MemberDirectory for StaticDirectory {
    fn profile(&self, member: &MemberId) -> Option<MemberProfile> {
        self.members.get(member).cloned()
    }
}

pub(super) type TestLedger = VisitLedger<MemoryRepository, MemoryNotifier, StaticPolicies>;

pub(super) fn build_ledger() -> (Arc<TestLedger>, Arc<MemoryRepository>, Arc<MemoryNotifier>) {
    build_ledger_with_policy(policy())
}

pub(super) fn build_ledger_with_policy(
    branch_policy: AttendancePolicy,
) -> (Arc<TestLedger>, Arc<MemoryRepository>, Arc<MemoryNotifier>) {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let policies = Arc::new(StaticPolicies::default().with_policy(BRANCH, branch_policy));
    let ledger = Arc::new(VisitLedger::new(
        repository.clone(),
        notifier.clone(),
        policies,
    ));
    (ledger, repository, notifier)
}

pub(super) fn directory() -> Arc<StaticDirectory> {
    Arc::new(
        StaticDirectory::default()
            .with_member("m-001", "Amina Hassan", "amina@example.com")
            .with_member("m-002", "Jonas Berg", "jonas@example.com"),
    )
}

pub(super) fn router_with(ledger: Arc<TestLedger>) -> axum::Router {
    attendance_router(ledger, directory())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
