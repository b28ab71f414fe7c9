use axum::{extract::State, Json};
use crate::models::HealthResponse;
use crate::AppState;
use tracing::debug;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        service: state.config.service_name.clone(),
    })
}

/// Readiness check endpoint
pub async fn ready_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Readiness check requested");
    let sessions = state.engine.registry().len().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        message: format!("Service is ready ({} open documents)", sessions),
        service: state.config.service_name.clone(),
    })
}
