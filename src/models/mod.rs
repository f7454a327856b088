pub mod answer;
pub mod documents;
pub mod entities;
pub mod perf;
pub mod query;
pub mod routing;
pub mod steps;

pub use answer::{
    AnswerSource, AskOutcome, ClarificationRequest, Coherence, ComponentHealth, ConfidenceImpact,
    DomainRejection, HealthReport, SynthesizedAnswer,
};
pub use documents::{
    ChunkMetadata, ExternalDocument, ExternalSearchResult, SourceType, VectorChunk,
};
pub use entities::{
    BreedType, ExtractedEntities, FeedBase, Intent, MissingField, Scored, Sex,
};
pub use perf::{AgeRange, MetricKind, PerfCatalog, PerfQuery, PerfResult, PerfRow};
pub use query::{
    AskRequest, ClarifyAnswersRequest, ConversationTurn, ExpandKnowledgeRequest,
    ExpandKnowledgeResponse,
};
pub use routing::{ConceptScores, QueryFilters, QueryRoute, RouteDecision};
pub use steps::{
    AggregateSummary, BasePerformance, CompromiseOutcome, ExecutedStep, FlockTotals, MetricValue,
    OptimizationConstraints, OptimizationOutcome, OrchestrationResult, QueryStep,
    ScenarioComparison, ScenarioParams, StepParams, StepResult, StepType, validate_dag,
};
