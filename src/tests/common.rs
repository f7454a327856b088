//! Shared fixtures for cross-service tests.
//!
//! Everything here is offline: the provider has no API key, the pools are
//! lazy, and no test may depend on a reachable backend.

use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    AgentRag, ClarificationEngine, CompletionClient, DomainGate, ExternalSourceManager,
    HybridSearchEngine, IngestionService, IntentExtractor, MultiStepOrchestrator, PerfStore,
    QueryPipeline, ResponseEnhancer, VectorRetriever, VectorStoreClient,
};

/// A pipeline wired exactly like `main.rs` does it, but with offline
/// collaborators and no rejection audit sink.
pub fn offline_pipeline() -> QueryPipeline {
    let config = Config::default();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .expect("lazy pool");

    let completion = Arc::new(CompletionClient::new(config.provider.clone()));
    let vector_store = Arc::new(VectorStoreClient::new(config.vector_store.clone()));
    let perf_store = Arc::new(PerfStore::new(pool));

    let gate = Arc::new(DomainGate::new(config.domain_gate.clone(), None));
    let extractor = Arc::new(IntentExtractor::new(Arc::clone(&completion)));
    let clarifier = Arc::new(ClarificationEngine::new(
        config.clarification.clone(),
        Arc::clone(&completion),
    ));

    let retriever = Arc::new(VectorRetriever::new(
        Arc::clone(&vector_store),
        Arc::clone(&completion),
    ));
    let hybrid = Arc::new(HybridSearchEngine::new(
        Arc::clone(&perf_store),
        Arc::clone(&retriever),
        Arc::clone(&completion),
    ));
    let orchestrator = Arc::new(MultiStepOrchestrator::new(Arc::clone(&perf_store)));
    let agent = Arc::new(AgentRag::new(
        Arc::clone(&hybrid),
        Arc::clone(&orchestrator),
        Arc::clone(&completion),
    ));
    let enhancer = Arc::new(ResponseEnhancer::new(Arc::clone(&completion)));

    let sources = Arc::new(ExternalSourceManager::with_sources(
        Vec::new(),
        Arc::clone(&completion),
        config.ranking.clone(),
        config.sources.max_results_per_source,
        config.sources.min_year,
    ));
    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&vector_store),
        config.chunking.clone(),
    ));

    QueryPipeline::new(
        gate,
        extractor,
        clarifier,
        agent,
        enhancer,
        sources,
        ingestion,
        perf_store,
        vector_store,
        completion,
        &config.i18n.default_language,
    )
}
