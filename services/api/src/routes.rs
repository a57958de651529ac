use crate::infra::{
    AppState, InMemoryMemberDirectory, InMemoryNotificationPublisher, InMemoryVisitRepository,
    StaticPolicyStore,
};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

use attendance_engine::attendance::{
    attendance_router, DeviceLogImporter, ImportReport, VisitLedger,
};
use attendance_engine::error::AppError;

pub(crate) type ApiLedger =
    VisitLedger<InMemoryVisitRepository, InMemoryNotificationPublisher, StaticPolicyStore>;

pub(crate) fn with_attendance_routes(
    ledger: Arc<ApiLedger>,
    directory: Arc<InMemoryMemberDirectory>,
) -> axum::Router {
    attendance_router(ledger, directory)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/attendance/device-log",
            axum::routing::post(device_log_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceLogRequest {
    /// Raw CSV export from a biometric terminal.
    pub(crate) csv: String,
}

pub(crate) async fn device_log_endpoint(
    Extension(ledger): Extension<Arc<ApiLedger>>,
    Json(payload): Json<DeviceLogRequest>,
) -> Result<Json<ImportReport>, AppError> {
    let reader = Cursor::new(payload.csv.into_bytes());
    let report = DeviceLogImporter::from_reader(reader, ledger.as_ref())?;
    Ok(Json(report))
}
