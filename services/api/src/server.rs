use crate::cli::ServeArgs;
use crate::infra::{
    seed_catalog, AppState, InMemoryApplicationRepository, InMemoryNotificationPublisher,
};
use crate::routes::with_admission_routes;
use admission_core::config::AppConfig;
use admission_core::error::AppError;
use admission_core::telemetry;
use admission_core::workflows::admission::{
    AdmissionService, CapacityLedger, ResourceCatalog, RetryPolicy,
};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

const DEFAULT_COURSE_SEATS: u32 = 40;

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

    let ledger = Arc::new(CapacityLedger::new(config.workflow.lock_timeout()));
    let catalog = ResourceCatalog::new(ledger.clone());
    seed_catalog(&catalog, DEFAULT_COURSE_SEATS)?;

    let repository = Arc::new(InMemoryApplicationRepository::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let retry = RetryPolicy {
        attempts: config.workflow.retry_attempts,
        backoff: config.workflow.retry_backoff(),
    };
    let admission_service = Arc::new(AdmissionService::new(repository, notifier, ledger, retry));

    let app = with_admission_routes(admission_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "admission workflow orchestrator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
