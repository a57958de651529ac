use chrono::{DateTime, NaiveDate, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use attendance_engine::attendance::{
    AttendanceNotification, AttendancePolicy, BranchId, CloseReason, MemberDirectory, MemberId,
    MemberProfile, NotificationPublisher, NotifyError, PolicyError, PolicySource, VisitKey,
    VisitRecord, VisitRepository, VisitStoreError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct LedgerState {
    records: Vec<VisitRecord>,
    open_index: HashMap<VisitKey, usize>,
}

/// Arena-backed ledger storage: closed records accumulate in insertion
/// order while the open index keyed by member and facility guards the
/// one-open-visit invariant under a single write lock.
#[derive(Default, Clone)]
pub(crate) struct InMemoryVisitRepository {
    state: Arc<Mutex<LedgerState>>,
}

impl VisitRepository for InMemoryVisitRepository {
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
        let index = state
            .open_index
            .remove(key)
            .ok_or(VisitStoreError::NotFound)?;
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

/// Buffers notifications for the messaging collaborator to drain; the demo
/// also reads it back to show what would have been sent.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<AttendanceNotification>>>,
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notification: AttendanceNotification) -> Result<(), NotifyError> {
        let mut guard = self.events.lock().expect("notifier mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotificationPublisher {
    pub(crate) fn events(&self) -> Vec<AttendanceNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

/// Branch policies held as validated snapshots, stand-in for the
/// branch-configuration collaborator.
#[derive(Default, Clone)]
pub(crate) struct StaticPolicyStore {
    branches: HashMap<BranchId, AttendancePolicy>,
}

impl StaticPolicyStore {
    pub(crate) fn with_policy(
        mut self,
        branch: &str,
        policy: AttendancePolicy,
    ) -> Result<Self, PolicyError> {
        let validated = policy.validated()?;
        self.branches.insert(BranchId(branch.to_string()), validated);
        Ok(self)
    }
}

impl PolicySource for StaticPolicyStore {
    fn snapshot(&self, branch: &BranchId) -> Result<AttendancePolicy, PolicyError> {
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownBranch(branch.clone()))
    }
}

/// Roster lookup backed by a plain map; the member CRUD surface owns the
/// real one.
#[derive(Default, Clone)]
pub(crate) struct InMemoryMemberDirectory {
    members: Arc<Mutex<HashMap<MemberId, MemberProfile>>>,
}

impl InMemoryMemberDirectory {
    pub(crate) fn upsert(&self, profile: MemberProfile) {
        self.members
            .lock()
            .expect("directory mutex poisoned")
            .insert(profile.member_id.clone(), profile);
    }
}

impl MemberDirectory for InMemoryMemberDirectory {
    fn profile(&self, member: &MemberId) -> Option<MemberProfile> {
        self.members
            .lock()
            .expect("directory mutex poisoned")
            .get(member)
            .cloned()
    }
}

pub(crate) const DEFAULT_BRANCH: &str = "downtown";

pub(crate) fn default_policy() -> AttendancePolicy {
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
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
