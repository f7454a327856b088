//! Health endpoint.

use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::AppState;
use crate::models::HealthReport;

/// Per-component health
/// GET /api/health
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Component health map", body = HealthReport)),
    tag = "System"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.pipeline.health().await)
}
