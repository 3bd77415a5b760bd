use crate::cli::ServeArgs;
use crate::infra::{simulated_sessions, AppState};
use crate::routes::with_credit_check_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenant_credit::config::AppConfig;
use tenant_credit::error::AppError;
use tenant_credit::telemetry;
use tenant_credit::workflows::credit_check::spawn_idle_sweeper;
use tracing::info;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        fee: config.credit_check.fee.clone(),
    };

    let sessions = simulated_sessions(&config.credit_check);
    let sweeper = spawn_idle_sweeper(Arc::clone(&sessions), SESSION_SWEEP_INTERVAL);
    let app = with_credit_check_routes(sessions)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        fee = %config.credit_check.fee.display_amount(),
        poll_interval_secs = config.credit_check.poll.interval.as_secs(),
        "tenant credit check service ready"
    );

    let served = axum::serve(listener, app).await;
    sweeper.abort();
    served?;
    Ok(())
}
