use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gallus::config::Config;
use gallus::services::{
    AgentRag, AuditService, ClarificationEngine, CompletionClient, DomainGate,
    ExternalSourceManager, HybridSearchEngine, IngestionService, IntentExtractor,
    MultiStepOrchestrator, PerfStore, QueryPipeline, ResponseEnhancer, VectorRetriever,
    VectorStoreClient,
};
use gallus::{AppState, db, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::ask::ask,
        handlers::ask::answer_clarification,
        handlers::knowledge::expand_knowledge,
        handlers::perf::perf_lookup,
        handlers::system::health,
    ),
    components(
        schemas(
            models::AskRequest,
            models::ClarifyAnswersRequest,
            models::ConversationTurn,
            models::ExpandKnowledgeRequest,
            models::ExpandKnowledgeResponse,
            models::AskOutcome,
            models::SynthesizedAnswer,
            models::AnswerSource,
            models::ClarificationRequest,
            models::DomainRejection,
            models::Coherence,
            models::ConfidenceImpact,
            models::PerfQuery,
            models::PerfResult,
            models::PerfRow,
            models::AgeRange,
            models::MetricKind,
            models::Sex,
            models::HealthReport,
            models::ComponentHealth,
            gallus::Language,
        )
    ),
    tags(
        (name = "Ask", description = "Question answering endpoints"),
        (name = "Knowledge", description = "Knowledge base expansion"),
        (name = "Performance", description = "Raw performance store access"),
        (name = "System", description = "Health and diagnostics"),
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    let _log_guard = if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("gallus.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };

    tracing::info!("Gallus starting up");
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database.url, config.database.max_connections).await?;
    tracing::info!("Performance store pool created successfully");

    let completion = Arc::new(CompletionClient::new(config.provider.clone()));
    let vector_store = Arc::new(VectorStoreClient::new(config.vector_store.clone()));
    let perf_store = Arc::new(PerfStore::new(pool.clone()));
    let audit = Arc::new(AuditService::new(pool.clone()));

    let gate = Arc::new(DomainGate::new(config.domain_gate.clone(), Some(Arc::clone(&audit))));
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

    let sources = Arc::new(ExternalSourceManager::from_config(
        &config.sources,
        config.ranking.clone(),
        Arc::clone(&completion),
    ));
    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&vector_store),
        config.chunking.clone(),
    ));

    let pipeline = Arc::new(QueryPipeline::new(
        gate,
        extractor,
        clarifier,
        agent,
        enhancer,
        sources,
        ingestion,
        Arc::clone(&perf_store),
        Arc::clone(&vector_store),
        Arc::clone(&completion),
        &config.i18n.default_language,
    ));
    tracing::info!("Query pipeline initialized");

    let app_state = Arc::new(AppState {
        db: pool,
        perf_store,
        vector_store,
        pipeline,
    });

    let api_routes = Router::new()
        .route("/api/ask", post(handlers::ask::ask))
        .route(
            "/api/conversations/:conversation_id/clarify",
            post(handlers::ask::answer_clarification),
        )
        .route("/api/knowledge/expand", post(handlers::knowledge::expand_knowledge))
        .route("/api/perf/lookup", post(handlers::perf::perf_lookup))
        .route("/api/health", get(handlers::system::health))
        .with_state(Arc::clone(&app_state));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);
    tracing::info!("Gallus is ready to serve requests");

    axum::serve(listener, app).await?;

    Ok(())
}
