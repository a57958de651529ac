use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{BranchId, PunchEvent};
use super::ledger::{PunchError, VisitLedger};
use super::policy::PolicySource;
use super::repository::{MemberDirectory, NotificationPublisher, VisitRepository};
use super::summary::{
    resolve_summary, AttendanceSummary, SummarySource, VisitQuery, VisitRecordView,
};

type AttendanceState<R, N, P, D> = (Arc<VisitLedger<R, N, P>>, Arc<D>);

/// Router builder exposing the punch ingestion and reporting endpoints.
pub fn attendance_router<R, N, P, D>(
    ledger: Arc<VisitLedger<R, N, P>>,
    directory: Arc<D>,
) -> Router
where
    R: VisitRepository + 'static,
    N: NotificationPublisher + 'static,
    P: PolicySource + 'static,
    D: MemberDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/attendance/punches",
            post(punch_handler::<R, N, P, D>),
        )
        .route(
            "/api/v1/attendance/visits",
            post(visits_handler::<R, N, P, D>),
        )
        .route(
            "/api/v1/attendance/summary",
            post(summary_handler::<R, N, P, D>),
        )
        .with_state((ledger, directory))
}

pub(crate) async fn punch_handler<R, N, P, D>(
    State((ledger, _)): State<AttendanceState<R, N, P, D>>,
    axum::Json(event): axum::Json<PunchEvent>,
) -> Response
where
    R: VisitRepository + 'static,
    N: NotificationPublisher + 'static,
    P: PolicySource + 'static,
    D: MemberDirectory + 'static,
{
    match ledger.record_punch(event) {
        Ok(record) => (StatusCode::ACCEPTED, axum::Json(record)).into_response(),
        Err(err @ PunchError::DuplicatePunchIn) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(
            err @ (PunchError::NoOpenVisit
            | PunchError::ManualCheckInDisabled
            | PunchError::Policy(_)),
        ) => {
            // Non-blocking warning to the originating collaborator; the
            // member is not held at the door over a data-processing error.
            let payload = json!({ "error": err.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn visits_handler<R, N, P, D>(
    State((ledger, directory)): State<AttendanceState<R, N, P, D>>,
    axum::Json(query): axum::Json<VisitQuery>,
) -> Response
where
    R: VisitRepository + 'static,
    N: NotificationPublisher + 'static,
    P: PolicySource + 'static,
    D: MemberDirectory + 'static,
{
    let policy = match ledger.policy_for(&query.branch_id) {
        Ok(policy) => policy,
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };

    match ledger.visits() {
        Ok(records) => {
            let views: Vec<VisitRecordView> = query
                .select(&records, &policy, directory.as_ref())
                .iter()
                .map(|record| VisitRecordView::from_record(record, &policy))
                .collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    #[serde(flatten)]
    pub query: VisitQuery,
    /// Upstream precomputed summary, preferred over the derived path when
    /// present. Both paths must agree for the same record set.
    #[serde(default)]
    pub precomputed: Option<AttendanceSummary>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub branch_id: BranchId,
    pub source: SummarySource,
    pub summary: AttendanceSummary,
}

pub(crate) async fn summary_handler<R, N, P, D>(
    State((ledger, directory)): State<AttendanceState<R, N, P, D>>,
    axum::Json(request): axum::Json<SummaryRequest>,
) -> Response
where
    R: VisitRepository + 'static,
    N: NotificationPublisher + 'static,
    P: PolicySource + 'static,
    D: MemberDirectory + 'static,
{
    let SummaryRequest { query, precomputed } = request;

    let policy = match ledger.policy_for(&query.branch_id) {
        Ok(policy) => policy,
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };

    match ledger.visits() {
        Ok(records) => {
            let selected = query.select(&records, &policy, directory.as_ref());
            let (summary, source) = resolve_summary(precomputed, &selected, &policy);
            let response = SummaryResponse {
                branch_id: query.branch_id,
                source,
                summary,
            };
            (StatusCode::OK, axum::Json(response)).into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
