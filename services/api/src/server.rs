use crate::cli::ServeArgs;
use crate::infra::{
    default_policy, AppState, InMemoryMemberDirectory, InMemoryNotificationPublisher,
    InMemoryVisitRepository, StaticPolicyStore, DEFAULT_BRANCH,
};
use crate::routes::with_attendance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use attendance_engine::attendance::{AutoCloseScheduler, VisitLedger};
use attendance_engine::config::AppConfig;
use attendance_engine::error::AppError;
use attendance_engine::telemetry;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryVisitRepository::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let policies = Arc::new(
        StaticPolicyStore::default().with_policy(DEFAULT_BRANCH, default_policy())?,
    );
    let directory = Arc::new(InMemoryMemberDirectory::default());
    let ledger = Arc::new(VisitLedger::new(
        repository.clone(),
        notifier,
        policies.clone(),
    ));

    let scheduler = Arc::new(AutoCloseScheduler::new(repository, policies));
    scheduler.spawn(config.scheduler.sweep_interval);

    let app = with_attendance_routes(ledger.clone(), directory)
        .layer(Extension(app_state))
        .layer(Extension(ledger))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "attendance engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
