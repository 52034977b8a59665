use crate::cli::ServeArgs;
use crate::infra::{registration_service, seed_fixtures, AppState, LogNotifier};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use crew_admission::config::AppConfig;
use crew_admission::error::AppError;
use crew_admission::telemetry;
use crew_admission::workflows::registration::{InMemoryStore, TaskRegistry, TracingObserver};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let store = InMemoryStore::default();
    if args.seed {
        seed_fixtures(&store);
        info!("seeded in-memory store with sample journeys");
    }
    let tasks = Arc::new(TaskRegistry::new());
    let registration_service = Arc::new(registration_service(
        &store,
        Arc::new(LogNotifier),
        &config.admission,
        Arc::clone(&tasks),
        Arc::new(TracingObserver),
    ));

    let app = with_registration_routes(registration_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "crew admission service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(readiness_flag))
        .await?;

    let pending = tasks.in_flight();
    if pending > 0 {
        info!(pending, "waiting for background assessments");
    }
    let drained = tasks.drain().await;
    info!(drained, "shutdown complete");
    Ok(())
}

async fn shutdown_signal(readiness: Arc<std::sync::atomic::AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    readiness.store(false, Ordering::Release);
    info!("shutdown signal received");
}
