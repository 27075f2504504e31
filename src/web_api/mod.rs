//! WebAPI - Control API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let detector_ok = match &state.detector {
        Some(detector) => detector.health_check().await,
        None => true,
    };
    let status = state.orchestrator.status();
    let transport_ok = status.light.map(|l| l.connected).unwrap_or(false);

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        pipeline_running: status.running,
        detector_connected: detector_ok,
        transport_connected: transport_ok,
    };

    Json(response)
}
