//! API Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use crate::activity_log::DEFAULT_CAPACITY;
use crate::error::Result;
use crate::frame_source::{CameraSource, RegisterSourceRequest};
use crate::models::{
    ActivityQuery, ApiResponse, LightsOnQuery, ManualOverrideRequest, SwitchCameraRequest,
};
use crate::smoother::FULL_BRIGHTNESS;
use crate::state::AppState;

/// Default number of activity entries returned
const DEFAULT_ACTIVITY_LIMIT: usize = 100;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(get_status))
        .route("/api/config", get(get_config))
        .route("/api/stats/reset", post(reset_stats))
        // Pipeline control
        .route("/api/pipeline/start", post(start_pipeline))
        .route("/api/pipeline/stop", post(stop_pipeline))
        .route("/api/pipeline/pause", post(pause_pipeline))
        .route("/api/pipeline/resume", post(resume_pipeline))
        // Cameras
        .route("/api/cameras", get(list_cameras))
        .route("/api/cameras", post(create_camera))
        .route("/api/cameras/switch", post(switch_camera))
        .route("/api/cameras/:id", delete(delete_camera))
        // Lights
        .route("/api/lights/manual", post(manual_override))
        .route("/api/lights/on", post(lights_on))
        .route("/api/lights/off", post(lights_off))
        .route("/api/lights/status", get(light_status))
        // Activity
        .route("/api/activity", get(list_activity))
        .with_state(state)
}

// ========================================
// Pipeline
// ========================================

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.orchestrator.status()))
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.pipeline.redacted()))
}

async fn reset_stats(State(state): State<AppState>) -> impl IntoResponse {
    state.orchestrator.reset_stats();
    Json(ApiResponse::success(state.orchestrator.status()))
}

async fn start_pipeline(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.orchestrator.start().await?;
    Ok(Json(ApiResponse::success(state.orchestrator.status())))
}

async fn stop_pipeline(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.orchestrator.stop().await?;
    Ok(Json(ApiResponse::success(state.orchestrator.status())))
}

async fn pause_pipeline(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.orchestrator.pause().await?;
    Ok(Json(ApiResponse::success(state.orchestrator.status())))
}

async fn resume_pipeline(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.orchestrator.resume().await?;
    Ok(Json(ApiResponse::success(state.orchestrator.status())))
}

// ========================================
// Cameras
// ========================================

async fn list_cameras(State(state): State<AppState>) -> impl IntoResponse {
    let cameras = state.orchestrator.registry().list_sources().await;
    Json(ApiResponse::success(cameras))
}

async fn create_camera(
    State(state): State<AppState>,
    Json(req): Json<RegisterSourceRequest>,
) -> Result<impl IntoResponse> {
    let source = CameraSource::from(req);
    state.orchestrator.registry().register(source.clone()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(source))))
}

async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let removed = state.orchestrator.registry().remove(&id).await?;
    Ok(Json(ApiResponse::success(removed)))
}

async fn switch_camera(
    State(state): State<AppState>,
    Json(req): Json<SwitchCameraRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.orchestrator.switch_camera(&req.camera_id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

// ========================================
// Lights
// ========================================

async fn manual_override(
    State(state): State<AppState>,
    Json(req): Json<ManualOverrideRequest>,
) -> Result<impl IntoResponse> {
    let brightness = req.brightness.min(u32::from(FULL_BRIGHTNESS)) as u8;
    let outcome = state.orchestrator.manual_override(brightness).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn lights_on(
    State(state): State<AppState>,
    Query(query): Query<LightsOnQuery>,
) -> Result<impl IntoResponse> {
    let brightness = query
        .brightness
        .map(|b| b.clamp(1, u32::from(FULL_BRIGHTNESS)) as u8)
        .unwrap_or(FULL_BRIGHTNESS);
    let outcome = state.orchestrator.manual_override(brightness).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn lights_off(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let outcome = state.orchestrator.manual_override(0).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn light_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.orchestrator.actuator().status()))
}

// ========================================
// Activity
// ========================================

async fn list_activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(DEFAULT_CAPACITY);
    let entries = state.orchestrator.activity().latest(limit).await;
    Json(ApiResponse::success(entries))
}
