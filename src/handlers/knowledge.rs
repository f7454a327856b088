//! Knowledge expansion API handler.

use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::AppState;
use crate::models::{ExpandKnowledgeRequest, ExpandKnowledgeResponse};
use crate::utils::ApiResult;

/// Expand the knowledge base from external sources
/// POST /api/knowledge/expand
#[utoipa::path(
    post,
    path = "/api/knowledge/expand",
    request_body = ExpandKnowledgeRequest,
    responses(
        (status = 200, description = "Expansion summary", body = ExpandKnowledgeResponse),
        (status = 502, description = "Backend failure"),
    ),
    tag = "Knowledge"
)]
pub async fn expand_knowledge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExpandKnowledgeRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state
        .pipeline
        .expand_knowledge(&request.query, request.language.as_deref())
        .await?;
    Ok(Json(response))
}
