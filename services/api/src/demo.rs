use crate::infra::{
    default_policy, parse_date, InMemoryMemberDirectory, InMemoryNotificationPublisher,
    InMemoryVisitRepository, StaticPolicyStore, DEFAULT_BRANCH,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use attendance_engine::attendance::{
    AttendanceSummary, AutoCloseScheduler, BranchId, DeviceLogImporter, FacilityId, MemberId,
    MemberProfile, PunchDirection, PunchEvent, VerificationMethod, VisitLedger, VisitQuery,
    VisitRecordView,
};
use attendance_engine::error::AppError;

#[derive(Args, Debug)]
pub(crate) struct SummaryArgs {
    /// Biometric device CSV export to replay
    #[arg(long)]
    pub(crate) device_log: PathBuf,
    /// Only include visits on or after this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) from: Option<NaiveDate>,
    /// Only include visits on or before this date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) to: Option<NaiveDate>,
    /// List only visits classified outside the normal duration band
    #[arg(long)]
    pub(crate) anomalies_only: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date of the synthetic demo day (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<NaiveDate>,
}

type DemoLedger =
    VisitLedger<InMemoryVisitRepository, InMemoryNotificationPublisher, StaticPolicyStore>;

struct DemoStack {
    ledger: Arc<DemoLedger>,
    repository: Arc<InMemoryVisitRepository>,
    notifier: Arc<InMemoryNotificationPublisher>,
    policies: Arc<StaticPolicyStore>,
    directory: Arc<InMemoryMemberDirectory>,
}

fn build_stack() -> Result<DemoStack, AppError> {
    let repository = Arc::new(InMemoryVisitRepository::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let policies = Arc::new(
        StaticPolicyStore::default().with_policy(DEFAULT_BRANCH, default_policy())?,
    );
    let directory = Arc::new(InMemoryMemberDirectory::default());
    let ledger = Arc::new(VisitLedger::new(
        repository.clone(),
        notifier.clone(),
        policies.clone(),
    ));

    Ok(DemoStack {
        ledger,
        repository,
        notifier,
        policies,
        directory,
    })
}

pub(crate) fn run_attendance_summary(args: SummaryArgs) -> Result<(), AppError> {
    let SummaryArgs {
        device_log,
        from,
        to,
        anomalies_only,
    } = args;

    let stack = build_stack()?;
    let report = DeviceLogImporter::from_path(&device_log, stack.ledger.as_ref())?;
    println!(
        "Replayed {} ({} punches applied, {} rejected)",
        device_log.display(),
        report.applied,
        report.rejected
    );

    let policy = stack
        .ledger
        .policy_for(&BranchId(DEFAULT_BRANCH.to_string()))?;
    let records = stack.ledger.visits()?;

    let mut query = VisitQuery::new(BranchId(DEFAULT_BRANCH.to_string()));
    query.from = from;
    query.to = to;
    query.anomalies_only = anomalies_only;
    let selected = query.select(&records, &policy, stack.directory.as_ref());

    println!("\nVisits ({}):", selected.len());
    for record in &selected {
        print_visit(&VisitRecordView::from_record(record, &policy));
    }

    let summary = AttendanceSummary::from_records(&selected, &policy);
    print_summary(&summary);

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());
    let opening = date
        .and_hms_opt(9, 0, 0)
        .expect("valid opening time")
        .and_utc();

    println!("Attendance engine demo for {date}");

    let stack = build_stack()?;
    seed_roster(&stack.directory);

    // A plausible morning: four clean visits plus one abandoned punch-in.
    let visits: &[(&str, &str, i64, Option<i64>)] = &[
        ("m-001", "gym-floor", 0, Some(60)),
        ("m-002", "gym-floor", 5, Some(95)),
        ("m-003", "pool", 10, Some(20)),
        ("m-004", "gym-floor", 15, Some(265)),
        ("m-005", "gym-floor", 20, None),
    ];

    for (member, facility, offset, duration) in visits {
        let punch_in = opening + Duration::minutes(*offset);
        stack
            .ledger
            .record_punch(demo_punch(member, facility, PunchDirection::In, punch_in))?;

        if let Some(minutes) = duration {
            stack.ledger.record_punch(demo_punch(
                member,
                facility,
                PunchDirection::Out,
                punch_in + Duration::minutes(*minutes),
            ))?;
        }
    }

    // Evening sweep: the abandoned visit crosses the 6h ceiling plus grace.
    let scheduler = AutoCloseScheduler::new(stack.repository.clone(), stack.policies.clone());
    let outcome = scheduler.sweep(opening + Duration::hours(7));
    println!(
        "\nAuto-close sweep: {} examined, {} closed, {} deferred",
        outcome.examined, outcome.closed, outcome.deferred
    );

    let policy = stack
        .ledger
        .policy_for(&BranchId(DEFAULT_BRANCH.to_string()))?;
    let records = stack.ledger.visits()?;

    println!("\nVisit ledger:");
    for record in &records {
        print_visit(&VisitRecordView::from_record(record, &policy));
    }

    let summary = AttendanceSummary::from_records(&records, &policy);
    print_summary(&summary);

    println!(
        "\n{} notifications queued for the messaging collaborator",
        stack.notifier.events().len()
    );

    Ok(())
}

fn seed_roster(directory: &InMemoryMemberDirectory) {
    for (id, name, email) in [
        ("m-001", "Amina Hassan", "amina@example.com"),
        ("m-002", "Jonas Berg", "jonas@example.com"),
        ("m-003", "Priya Nair", "priya@example.com"),
        ("m-004", "Tomas Silva", "tomas@example.com"),
        ("m-005", "Lena Fischer", "lena@example.com"),
    ] {
        directory.upsert(MemberProfile {
            member_id: MemberId(id.to_string()),
            full_name: name.to_string(),
            email: email.to_string(),
        });
    }
}

fn demo_punch(
    member: &str,
    facility: &str,
    direction: PunchDirection,
    timestamp: DateTime<Utc>,
) -> PunchEvent {
    PunchEvent {
        member_id: MemberId(member.to_string()),
        facility_id: FacilityId(facility.to_string()),
        branch_id: BranchId(DEFAULT_BRANCH.to_string()),
        direction,
        timestamp,
        method: VerificationMethod::Biometric,
    }
}

fn print_visit(view: &VisitRecordView) {
    let duration = view
        .duration_minutes
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());
    let classification = view.classification.unwrap_or("-");
    println!(
        "- {} @ {} | {} | {} | {} | {}",
        view.member_id, view.facility_id, view.status, duration, classification, view.close_reason
    );
}

fn print_summary(summary: &AttendanceSummary) {
    println!("\nSummary");
    println!("- total visits: {}", summary.total_visits);
    println!("- unique members: {}", summary.unique_members);
    println!(
        "- average duration: {}",
        format_duration(summary.avg_duration_minutes)
    );
    println!("- anomalies: {}", summary.anomaly_count);
}

/// Hours/minutes split for console output. The raw minute value stays the
/// domain contract; this formatting never leaves the display layer.
fn format_duration(minutes: i64) -> String {
    let hours = minutes / 60;
    let remainder = minutes % 60;
    if hours > 0 {
        format!("{hours}h {remainder:02}m")
    } else {
        format!("{minutes}m")
    }
}
