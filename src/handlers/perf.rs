//! Raw performance lookup handler, mainly for tests and tooling.

use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::AppState;
use crate::models::{PerfQuery, PerfResult};
use crate::utils::ApiResult;

/// Typed performance store lookup
/// POST /api/perf/lookup
#[utoipa::path(
    post,
    path = "/api/perf/lookup",
    request_body = PerfQuery,
    responses(
        (status = 200, description = "Matching performance rows", body = PerfResult),
        (status = 404, description = "No rows matched the filters"),
        (status = 502, description = "Store backend failure"),
    ),
    tag = "Performance"
)]
pub async fn perf_lookup(
    State(state): State<Arc<AppState>>,
    Json(query): Json<PerfQuery>,
) -> ApiResult<impl IntoResponse> {
    let result = state.perf_store.query(&query).await?;
    Ok(Json(result))
}
