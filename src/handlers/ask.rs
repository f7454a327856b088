//! Ask API handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::AppState;
use crate::models::{AskOutcome, AskRequest, ClarifyAnswersRequest};
use crate::utils::ApiResult;

/// Ask a question
/// POST /api/ask
///
/// Returns a synthesized answer, a clarification request (200 with
/// `type=clarification`), or a domain rejection (422).
#[utoipa::path(
    post,
    path = "/api/ask",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer or clarification", body = AskOutcome),
        (status = 422, description = "Question rejected as off-domain", body = AskOutcome),
        (status = 502, description = "Backend failure"),
    ),
    tag = "Ask"
)]
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> ApiResult<Response> {
    let outcome = state.pipeline.ask(&request).await?;

    let response = match &outcome {
        AskOutcome::Rejected(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(outcome)).into_response()
        },
        _ => Json(outcome).into_response(),
    };
    Ok(response)
}

/// Answer a pending clarification
/// POST /api/conversations/:conversation_id/clarify
#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/clarify",
    request_body = ClarifyAnswersRequest,
    params(("conversation_id" = String, Path, description = "Conversation identifier")),
    responses(
        (status = 200, description = "Answer built from the clarified question", body = AskOutcome),
        (status = 422, description = "Question rejected as off-domain", body = AskOutcome),
    ),
    tag = "Ask"
)]
pub async fn answer_clarification(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Json(request): Json<ClarifyAnswersRequest>,
) -> ApiResult<Response> {
    tracing::debug!("clarification answers for conversation {}", conversation_id);

    let outcome = state.pipeline.answer_clarification(&request).await?;

    let response = match &outcome {
        AskOutcome::Rejected(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(outcome)).into_response()
        },
        _ => Json(outcome).into_response(),
    };
    Ok(response)
}
