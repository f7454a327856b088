//! Gallus Library
//!
//! Query orchestration and retrieval engine for poultry husbandry
//! question answering.

use sqlx::PgPool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod localization;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use localization::Language;
pub use services::{
    AgentRag, ClarificationEngine, CompletionClient, DomainGate, ExternalSourceManager,
    HybridSearchEngine, IngestionService, IntentExtractor, MultiStepOrchestrator, PerfStore,
    QueryPipeline, ResponseEnhancer, VectorRetriever, VectorStoreClient,
};
pub use utils::{ApiError, ApiResult, CoreError};

/// Application shared state
///
/// All services are wrapped in Arc for cheap cloning and thread safety;
/// the pipeline owns the wiring between them.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub perf_store: Arc<PerfStore>,
    pub vector_store: Arc<VectorStoreClient>,
    pub pipeline: Arc<QueryPipeline>,
}
