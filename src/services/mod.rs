pub mod agent_rag;
pub mod audit;
pub mod chunking;
pub mod clarification;
pub mod completion;
pub mod concept_router;
pub mod domain_gate;
pub mod enhancer;
pub mod external_sources;
pub mod hybrid_search;
pub mod ingestion;
pub mod intent;
pub mod orchestrator;
pub mod perf_store;
pub mod pipeline;
pub mod vector_retriever;
pub mod vector_store;

pub use agent_rag::{AgentRag, QueryComplexity, SubQuery};
pub use audit::AuditService;
pub use chunking::{Chunk, SemanticChunker};
pub use clarification::{ClarificationEngine, ClarificationVerdict};
pub use completion::{CompletionClient, ProviderError};
pub use concept_router::ConceptRouter;
pub use domain_gate::{DomainGate, GateDecision};
pub use enhancer::{Enhancement, ResponseEnhancer};
pub use external_sources::{
    EuropePmcFetcher, ExternalSourceManager, FaoFetcher, PubMedFetcher, SemanticScholarFetcher,
    SourceFetcher,
};
pub use hybrid_search::{HybridSearchEngine, SearchOutcome};
pub use ingestion::{IngestOutcome, IngestionService};
pub use intent::{ExtractionOutcome, IntentExtractor};
pub use orchestrator::MultiStepOrchestrator;
pub use perf_store::PerfStore;
pub use pipeline::QueryPipeline;
pub use vector_retriever::VectorRetriever;
pub use vector_store::{VectorStoreClient, WhereClause};
