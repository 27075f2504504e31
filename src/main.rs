//! Occupancy Lighting - Detection Driven Light Control
//!
//! Main entry point for the occupancy lighting service.

use occupancy_lighting::{
    activity_log::ActivityLog,
    actuator::{build_transport, spawn_actuator, LightActuator},
    clock::{Clock, SystemClock},
    detection::{DetectionAdapter, HttpDetector},
    frame_source::{CameraSource, FrameSourceRegistry, HttpSnapshotConnector},
    orchestrator::{OrchestratorSettings, PipelineOrchestrator},
    pipeline_config::PipelineConfig,
    smoother::OccupancySmoother,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time allowed for the final off command on shutdown
const SHUTDOWN_SETTLE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "occupancy_lighting=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Occupancy Lighting v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        pipeline_config = %config.pipeline_config.display(),
        detector_url = %config.detector_url,
        auto_start = config.auto_start,
        "Configuration loaded"
    );

    let pipeline = PipelineConfig::load(&config.pipeline_config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Frame sources
    let connector = Arc::new(HttpSnapshotConnector::new(
        pipeline.capture.read_timeout(),
        pipeline.capture.frame_interval(),
    )?);
    let registry = Arc::new(FrameSourceRegistry::new(connector));
    for camera in pipeline.cameras.iter().cloned() {
        registry.register(CameraSource::from(camera)).await?;
    }
    if let Some(default_camera) = &pipeline.default_camera {
        registry.select(default_camera).await?;
    }
    tracing::info!(cameras = pipeline.cameras.len(), "FrameSourceRegistry initialized");

    // Detection
    let detector = Arc::new(HttpDetector::new(config.detector_url.clone())?);
    let adapter = Arc::new(DetectionAdapter::new(
        detector.clone(),
        pipeline.detection.clone(),
    ));
    tracing::info!(detector_url = %detector.base_url(), "DetectionAdapter initialized");

    // Actuation
    let transport = build_transport(&pipeline.transport)?;
    let actuator = LightActuator::new(transport, pipeline.actuator.clone());
    let actuator = Arc::new(spawn_actuator(actuator, clock.clone()));
    tracing::info!(
        topic = %pipeline.actuator.topic,
        cooldown_ms = pipeline.actuator.cooldown_ms,
        "LightActuator started"
    );

    let smoother = OccupancySmoother::new(pipeline.brightness.clone(), pipeline.smoothing.clone());
    let activity = Arc::new(ActivityLog::default());

    let orchestrator = Arc::new(PipelineOrchestrator::new(
        registry,
        adapter,
        smoother,
        actuator.clone(),
        activity,
        clock,
        OrchestratorSettings {
            capture: pipeline.capture.clone(),
            turn_off_on_stop: pipeline.actuator.turn_off_on_stop,
        },
    ));
    tracing::info!("PipelineOrchestrator initialized");

    if config.auto_start {
        if let Err(e) = orchestrator.start().await {
            tracing::warn!(error = %e, "Pipeline not started at boot");
        }
    }

    let state = AppState::new(
        config.clone(),
        orchestrator.clone(),
        Arc::new(pipeline),
        Some(detector),
    );

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    orchestrator.stop().await?;
    if !actuator.settle(SHUTDOWN_SETTLE).await {
        tracing::warn!("Final light command not confirmed before exit");
    }
    actuator.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
