use crate::cli::ServeArgs;
use crate::infra::{load_directory, AppState};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use mbkm_registration::config::AppConfig;
use mbkm_registration::error::AppError;
use mbkm_registration::telemetry;
use mbkm_registration::workflows::registration::{MemoryBackend, RegistrationService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let backend = MemoryBackend::with_directory(load_directory(&config.directory)?);
    let registration_service = Arc::new(RegistrationService::new(
        backend.dependencies(),
        config.schedule,
    ));

    let app = with_registration_routes(registration_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        weeks_per_month = config.schedule.weeks_per_month,
        "registration service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
