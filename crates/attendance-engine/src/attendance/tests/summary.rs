use super::common::*;
use chrono::NaiveDate;

use crate::attendance::domain::{BranchId, FacilityId, PunchDirection, VisitRecord};
use crate::attendance::summary::{resolve_summary, AttendanceSummary, SummarySource, VisitQuery};

fn fixture_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date")
}

#[test]
fn scenario_ten_visits_seven_members() {
    let date = fixture_date();
    let mut records: Vec<VisitRecord> = (1..=7)
        .map(|n| closed_visit(&format!("m-{n:03}"), date, 60))
        .collect();
    records.push(closed_visit("m-001", date, 60));
    records.push(closed_visit("m-002", date, 60));
    records.push(closed_visit("m-003", date, 60));

    let summary = AttendanceSummary::from_records(&records, &policy());

    assert_eq!(summary.total_visits, 10);
    assert_eq!(summary.unique_members, 7);
    assert_eq!(summary.avg_duration_minutes, 60);
    assert_eq!(summary.anomaly_count, 0);
}

#[test]
fn open_records_are_excluded_from_average_and_anomalies() {
    let date = fixture_date();
    let open = VisitRecord::open(&punch("m-009", PunchDirection::In, at(9, 0)), date);
    let records = vec![closed_visit("m-001", date, 60), open];

    let summary = AttendanceSummary::from_records(&records, &policy());

    assert_eq!(summary.total_visits, 2);
    assert_eq!(summary.unique_members, 2);
    assert_eq!(summary.avg_duration_minutes, 60);
    assert_eq!(summary.anomaly_count, 0);
}

#[test]
fn no_closed_records_yields_zero_average() {
    let date = fixture_date();
    let open = VisitRecord::open(&punch("m-001", PunchDirection::In, at(9, 0)), date);

    let summary = AttendanceSummary::from_records(&[open], &policy());
    assert_eq!(summary.avg_duration_minutes, 0);
    assert_eq!(summary.anomaly_count, 0);
}

#[test]
fn empty_record_set_is_all_zeroes() {
    let summary = AttendanceSummary::from_records(&[], &policy());
    assert_eq!(summary, AttendanceSummary::default());
}

#[test]
fn average_rounds_to_nearest_minute() {
    let date = fixture_date();
    let records = vec![
        closed_visit("m-001", date, 61),
        closed_visit("m-002", date, 62),
    ];

    let summary = AttendanceSummary::from_records(&records, &policy());
    assert_eq!(summary.avg_duration_minutes, 62);
}

#[test]
fn anomalies_count_both_bands() {
    let date = fixture_date();
    let records = vec![
        closed_visit("m-001", date, 10),
        closed_visit("m-002", date, 90),
        closed_visit("m-003", date, 245),
    ];

    let summary = AttendanceSummary::from_records(&records, &policy());
    assert_eq!(summary.anomaly_count, 2);
}

#[test]
fn derived_summary_matches_upstream_equivalence() {
    let date = fixture_date();
    let records = vec![
        closed_visit("m-001", date, 45),
        closed_visit("m-002", date, 12),
        closed_visit("m-003", date, 250),
    ];
    let branch_policy = policy();

    let derived = AttendanceSummary::from_records(&records, &branch_policy);

    let (fallback, source) = resolve_summary(None, &records, &branch_policy);
    assert_eq!(source, SummarySource::Derived);
    assert_eq!(fallback, derived);

    let (preferred, source) = resolve_summary(Some(derived), &records, &branch_policy);
    assert_eq!(source, SummarySource::Upstream);
    assert_eq!(preferred, derived);
}

#[test]
fn query_filters_by_branch_window_and_facility() {
    let date = fixture_date();
    let mut elsewhere = closed_visit("m-001", date, 60);
    elsewhere.branch_id = BranchId("uptown".to_string());

    let mut pool = closed_visit("m-002", date, 60);
    pool.facility_id = FacilityId("pool".to_string());

    let early = closed_visit(
        "m-003",
        NaiveDate::from_ymd_opt(2026, 2, 20).expect("valid date"),
        60,
    );
    let in_window = closed_visit("m-004", date, 60);

    let records = vec![elsewhere, pool.clone(), early, in_window.clone()];
    let branch_policy = policy();
    let dir = directory();

    let mut query = VisitQuery::new(BranchId(BRANCH.to_string()));
    query.from = NaiveDate::from_ymd_opt(2026, 3, 1);
    query.to = NaiveDate::from_ymd_opt(2026, 3, 31);

    let selected = query.select(&records, &branch_policy, dir.as_ref());
    assert_eq!(selected.len(), 2);

    query.facility_id = Some(FacilityId("pool".to_string()));
    let selected = query.select(&records, &branch_policy, dir.as_ref());
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].member_id, pool.member_id);
}

#[test]
fn query_searches_name_email_and_raw_id() {
    let date = fixture_date();
    let records = vec![
        closed_visit("m-001", date, 60),
        closed_visit("m-002", date, 60),
        closed_visit("m-777", date, 60),
    ];
    let branch_policy = policy();
    let dir = directory();

    let mut query = VisitQuery::new(BranchId(BRANCH.to_string()));
    query.search = Some("amina".to_string());
    assert_eq!(query.select(&records, &branch_policy, dir.as_ref()).len(), 1);

    query.search = Some("JONAS@EXAMPLE.COM".to_string());
    assert_eq!(query.select(&records, &branch_policy, dir.as_ref()).len(), 1);

    // m-777 is not in the roster; the raw identifier still matches.
    query.search = Some("m-777".to_string());
    assert_eq!(query.select(&records, &branch_policy, dir.as_ref()).len(), 1);

    query.search = Some("nobody".to_string());
    assert!(query.select(&records, &branch_policy, dir.as_ref()).is_empty());
}

#[test]
fn anomalies_only_view_excludes_open_and_normal_visits() {
    let date = fixture_date();
    let open = VisitRecord::open(&punch("m-009", PunchDirection::In, at(9, 0)), date);
    let records = vec![
        closed_visit("m-001", date, 10),
        closed_visit("m-002", date, 90),
        open,
    ];
    let branch_policy = policy();
    let dir = directory();

    let mut query = VisitQuery::new(BranchId(BRANCH.to_string()));
    query.anomalies_only = true;

    let selected = query.select(&records, &branch_policy, dir.as_ref());
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].duration_minutes, Some(10));
}
