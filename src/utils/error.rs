//! Core error taxonomy and its HTTP mapping.
//!
//! Input-level outcomes (domain rejection, clarification) are normal flow
//! control and travel through `AskOutcome`, never through this module.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::services::completion::ProviderError;

/// Errors produced by the retrieval and orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The performance store matched zero rows. Not a transport failure.
    #[error("no performance rows matched the requested filters")]
    PerfStoreEmpty,

    #[error("performance store backend error: {0}")]
    PerfStoreBackend(#[from] sqlx::Error),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("completion provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("external source error: {0}")]
    Source(String),

    /// Malformed JSON or adapter payload. Never retried.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("step {step} skipped: dependency {missing} has no result")]
    DependencyUnsatisfied { step: u32, missing: u32 },

    #[error("unknown step type: {0}")]
    UnknownStepType(String),

    #[error("request cancelled")]
    Cancelled,
}

impl CoreError {
    /// Transient backend errors are retried with bounded backoff; data and
    /// logic errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PerfStoreBackend(_)
            | Self::VectorStore(_)
            | Self::Embedding(_)
            | Self::Source(_) => true,
            Self::Provider(e) => e.is_retryable(),
            _ => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Axum-facing wrapper carrying the error-to-HTTP contract consumed by the
/// API layer.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl<E> From<E> for ApiError
where
    E: Into<CoreError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::PerfStoreEmpty => StatusCode::NOT_FOUND,
            CoreError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            },
            CoreError::PerfStoreBackend(_)
            | CoreError::VectorStore(_)
            | CoreError::Embedding(_)
            | CoreError::Provider(_)
            | CoreError::Source(_)
            | CoreError::Parse(_) => StatusCode::BAD_GATEWAY,
            CoreError::DependencyUnsatisfied { .. } | CoreError::UnknownStepType(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        }

        // Internal messages are never shown verbatim; the body carries a
        // stable machine-readable code only.
        let code = match &self.0 {
            CoreError::PerfStoreEmpty => "perf_store_empty",
            CoreError::Cancelled => "cancelled",
            CoreError::PerfStoreBackend(_) => "perf_store_backend",
            CoreError::VectorStore(_) => "vector_store",
            CoreError::Embedding(_) => "embedding",
            CoreError::Provider(_) => "provider",
            CoreError::Source(_) => "source",
            CoreError::Parse(_) => "parse",
            CoreError::DependencyUnsatisfied { .. } => "dependency_unsatisfied",
            CoreError::UnknownStepType(_) => "unknown_step_type",
        };

        (status, Json(json!({ "error": code }))).into_response()
    }
}
