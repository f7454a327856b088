//! Query pipeline - the end-to-end flow behind the public endpoints.
//!
//! gate -> intent -> clarification -> agent (simple or decomposed) ->
//! enhancer. Knowledge expansion runs the source fan-out and ingestion so
//! later questions benefit through the vector retriever.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::localization::Language;
use crate::models::{
    AskOutcome, AskRequest, ClarifyAnswersRequest, ComponentHealth, ConfidenceImpact,
    ConversationTurn, ExpandKnowledgeResponse, HealthReport, SynthesizedAnswer,
};
use crate::services::agent_rag::AgentRag;
use crate::services::clarification::{ClarificationEngine, ClarificationVerdict};
use crate::services::completion::CompletionClient;
use crate::services::domain_gate::DomainGate;
use crate::services::enhancer::ResponseEnhancer;
use crate::services::external_sources::ExternalSourceManager;
use crate::services::ingestion::IngestionService;
use crate::services::intent::IntentExtractor;
use crate::services::perf_store::PerfStore;
use crate::services::vector_store::VectorStoreClient;
use crate::utils::CoreError;

pub struct QueryPipeline {
    gate: Arc<DomainGate>,
    extractor: Arc<IntentExtractor>,
    clarifier: Arc<ClarificationEngine>,
    agent: Arc<AgentRag>,
    enhancer: Arc<ResponseEnhancer>,
    sources: Arc<ExternalSourceManager>,
    ingestion: Arc<IngestionService>,
    perf_store: Arc<PerfStore>,
    vector_store: Arc<VectorStoreClient>,
    completion: Arc<CompletionClient>,
    default_language: Language,
}

impl QueryPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gate: Arc<DomainGate>,
        extractor: Arc<IntentExtractor>,
        clarifier: Arc<ClarificationEngine>,
        agent: Arc<AgentRag>,
        enhancer: Arc<ResponseEnhancer>,
        sources: Arc<ExternalSourceManager>,
        ingestion: Arc<IngestionService>,
        perf_store: Arc<PerfStore>,
        vector_store: Arc<VectorStoreClient>,
        completion: Arc<CompletionClient>,
        default_language_tag: &str,
    ) -> Self {
        let default_language =
            Language::parse_tag(default_language_tag).unwrap_or_default();
        Self {
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
            default_language,
        }
    }

    pub fn resolve_language(&self, tag: Option<&str>) -> Language {
        tag.and_then(Language::parse_tag).unwrap_or(self.default_language)
    }

    /// Full ask flow for one question.
    pub async fn ask(&self, request: &AskRequest) -> Result<AskOutcome, CoreError> {
        let query_id = uuid::Uuid::new_v4();
        let language = self.resolve_language(request.language.as_deref());
        tracing::info!(
            %query_id,
            language = language.as_str(),
            conversation = request.conversation_id.as_deref().unwrap_or("-"),
            tenant = request.tenant_id.as_deref().unwrap_or("-"),
            "processing question"
        );

        let gate_decision = self.gate.check(&request.question, language).await;
        if let Some(rejection) = gate_decision.rejection {
            return Ok(AskOutcome::Rejected(rejection));
        }

        let extraction = self
            .extractor
            .extract(&request.question, &request.history, language)
            .await;

        let verdict = self
            .clarifier
            .assess(&request.question, extraction.intent, &extraction.entities, language)
            .await;
        if let ClarificationVerdict::Needed(clarification) = verdict {
            return Ok(AskOutcome::Clarification(clarification));
        }

        let outcome = self
            .agent
            .answer(&request.question, extraction.intent, &extraction.entities, language)
            .await;

        if let Some(clarification) = outcome.clarification {
            return Ok(AskOutcome::Clarification(clarification));
        }

        let missing = extraction.entities.missing_critical(extraction.intent);
        let context = conversation_context(&request.history);

        let enhancement = self
            .enhancer
            .enhance(
                &outcome.answer,
                &extraction.entities,
                &missing,
                &context,
                &request.question,
                &extraction.enriched_question,
                language,
            )
            .await;

        if enhancement.enhanced_answer.trim().is_empty() {
            return Err(CoreError::Parse("synthesized answer is empty".to_string()));
        }

        let confidence = match enhancement.confidence_impact {
            ConfidenceImpact::Low => outcome.confidence,
            ConfidenceImpact::Medium => outcome.confidence * 0.85,
            ConfidenceImpact::High => outcome.confidence * 0.7,
        }
        .clamp(0.0, 1.0);

        Ok(AskOutcome::Answer(SynthesizedAnswer {
            text: enhancement.enhanced_answer,
            confidence,
            sources: outcome.sources,
            coherence: enhancement.coherence,
            warnings: enhancement.warnings,
            optional_clarifications: enhancement.optional_clarifications,
        }))
    }

    /// Re-run the pipeline with the clarification answers folded into the
    /// question. The engine stays stateless; the caller supplies the
    /// original question alongside the answers.
    pub async fn answer_clarification(
        &self,
        request: &ClarifyAnswersRequest,
    ) -> Result<AskOutcome, CoreError> {
        let merged_question = merge_clarification(&request.question, &request.answers);

        let ask_request = AskRequest {
            question: merged_question,
            language: request.language.clone(),
            conversation_id: None,
            tenant_id: None,
            history: request.history.clone(),
        };

        self.ask(&ask_request).await
    }

    /// Proactive knowledge expansion: fan out, then ingest the ranked
    /// documents.
    pub async fn expand_knowledge(
        &self,
        query: &str,
        language_tag: Option<&str>,
    ) -> Result<ExpandKnowledgeResponse, CoreError> {
        let language = self.resolve_language(language_tag);

        let search = self.sources.search(query).await;
        if !search.found {
            return Ok(ExpandKnowledgeResponse {
                documents_ingested: 0,
                sources_succeeded: search.sources_succeeded,
            });
        }

        let mut documents_ingested = 0usize;
        for document in &search.all_documents {
            match self.ingestion.ingest_document(document, query, language).await {
                Ok(outcome) if outcome.is_ingested() => documents_ingested += 1,
                Ok(_) => {},
                Err(e) => tracing::warn!("ingestion failed for '{}': {}", document.title, e),
            }
        }

        Ok(ExpandKnowledgeResponse {
            documents_ingested,
            sources_succeeded: search.sources_succeeded,
        })
    }

    /// Component health as seen from this process.
    pub async fn health(&self) -> HealthReport {
        let mut components = BTreeMap::new();

        components.insert(
            "perf_store".to_string(),
            if self.perf_store.ping().await { ComponentHealth::Ok } else { ComponentHealth::Down },
        );
        components.insert(
            "vector_store".to_string(),
            if self.vector_store.ping().await {
                ComponentHealth::Ok
            } else {
                ComponentHealth::Down
            },
        );
        components.insert(
            "completion_provider".to_string(),
            if self.completion.is_available() {
                ComponentHealth::Ok
            } else {
                ComponentHealth::Degraded
            },
        );
        components.insert(
            "external_sources".to_string(),
            if self.sources.source_count() > 0 {
                ComponentHealth::Ok
            } else {
                ComponentHealth::Degraded
            },
        );

        HealthReport { components }
    }
}

fn conversation_context(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

fn merge_clarification(question: &str, answers: &BTreeMap<u32, String>) -> String {
    let details = answers
        .values()
        .map(String::as_str)
        .filter(|a| !a.trim().is_empty())
        .collect::<Vec<_>>()
        .join(". ");

    if details.is_empty() {
        question.to_string()
    } else {
        format!("{question}. {details}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarification_answers_merge_into_question() {
        let answers = BTreeMap::from([
            (1u32, "Ross 308".to_string()),
            (2u32, "35 jours".to_string()),
        ]);
        let merged = merge_clarification("Mes poulets ne grossissent pas", &answers);
        assert_eq!(merged, "Mes poulets ne grossissent pas. Ross 308. 35 jours");
    }

    #[test]
    fn context_keeps_last_three_turns_in_order() {
        let history: Vec<ConversationTurn> = (1..=5)
            .map(|i| ConversationTurn {
                question: format!("q{i}"),
                answer: format!("a{i}"),
            })
            .collect();
        let context = conversation_context(&history);
        assert!(!context.contains("q2"));
        assert!(context.contains("q3"));
        let q3_pos = context.find("q3").unwrap();
        let q5_pos = context.find("q5").unwrap();
        assert!(q3_pos < q5_pos);
    }
}
