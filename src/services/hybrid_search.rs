//! Hybrid search engine.
//!
//! Routes a question through the concept router, runs the performance
//! store and/or the vector retriever, and synthesizes a narrated answer.
//! Every provider-backed step has a deterministic fallback so the path to
//! an answer never depends on provider availability.

use std::sync::Arc;

use crate::localization::{Language, MessageId, message};
use crate::models::{
    AnswerSource, ClarificationRequest, ExtractedEntities, Intent, PerfQuery, PerfResult,
    QueryFilters, QueryRoute, RouteDecision, VectorChunk,
};
use crate::services::completion::CompletionClient;
use crate::services::concept_router::ConceptRouter;
use crate::services::perf_store::PerfStore;
use crate::services::vector_retriever::{DEFAULT_TOP_K, VectorRetriever};
use crate::utils::CoreError;

/// Context chunks fetched alongside a deterministic lookup.
const LIGHT_CONTEXT_K: usize = 3;

const SYSTEM_PROMPT: &str = "You are a poultry production expert. Answer precisely, \
    cite the numbers you were given, and never invent data that is not in the context.";

/// Unified outcome of one routed search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<AnswerSource>,
    pub route: QueryRoute,
    pub perf: Option<PerfResult>,
    pub chunks: Vec<VectorChunk>,
    /// Populated only on the clarify route.
    pub clarification: Option<ClarificationRequest>,
}

pub struct HybridSearchEngine {
    router: ConceptRouter,
    perf_store: Arc<PerfStore>,
    retriever: Arc<VectorRetriever>,
    completion: Arc<CompletionClient>,
}

impl HybridSearchEngine {
    pub fn new(
        perf_store: Arc<PerfStore>,
        retriever: Arc<VectorRetriever>,
        completion: Arc<CompletionClient>,
    ) -> Self {
        Self { router: ConceptRouter::new(), perf_store, retriever, completion }
    }

    pub async fn search(
        &self,
        query: &str,
        intent: Intent,
        entities: &ExtractedEntities,
        language: Language,
    ) -> SearchOutcome {
        let decision = self.router.analyze(query, intent, entities);
        tracing::info!(
            "route={} confidence={:.2} filters={:?}",
            decision.route.as_str(),
            decision.confidence,
            decision.filters
        );

        match decision.route {
            QueryRoute::PerfStore => self.search_performance(query, &decision, language).await,
            QueryRoute::Vector => self.search_contextual(query, &decision, language).await,
            QueryRoute::Hybrid => self.search_hybrid(query, &decision, language).await,
            QueryRoute::Clarify => self.clarify_with_catalog(&decision, language).await,
        }
    }

    async fn search_performance(
        &self,
        query: &str,
        decision: &RouteDecision,
        language: Language,
    ) -> SearchOutcome {
        let perf_query = perf_query_from_filters(&decision.filters);

        let perf = match self.perf_store.query(&perf_query).await {
            Ok(result) => result,
            Err(CoreError::PerfStoreEmpty) => {
                return SearchOutcome {
                    answer: message(language, MessageId::NoPerformanceData).to_string(),
                    confidence: 0.3,
                    sources: Vec::new(),
                    route: QueryRoute::PerfStore,
                    perf: None,
                    chunks: Vec::new(),
                    clarification: None,
                };
            },
            Err(e) => {
                tracing::error!("performance lookup failed: {}", e);
                return self.apology(QueryRoute::PerfStore, language);
            },
        };

        // Light contextual enrichment; failures here never degrade the
        // deterministic result.
        let chunks = self
            .retriever
            .retrieve(query, &decision.filters, LIGHT_CONTEXT_K)
            .await
            .unwrap_or_default();

        let data_block = format_perf_rows(&perf);
        let context_block = format_chunks(&chunks);
        let user_prompt = format!(
            "Answer the question using the performance table below.\n\
             QUESTION: {query}\n\nPERFORMANCE DATA:\n{data_block}\n\n\
             ADDITIONAL CONTEXT:\n{context_block}\n\n\
             Provide: the relevant figures with units, a short interpretation, \
             recommendations if appropriate, and the data sources. \
             Answer in '{lang}'.",
            lang = language.as_str()
        );

        let answer = match self.narrate(&user_prompt).await {
            Some(text) => text,
            None => data_block.clone(),
        };

        let confidence = (0.8 + perf.confidence * 0.2).min(1.0);
        let mut sources = perf_sources(&perf);
        sources.extend(chunk_sources(&chunks));

        SearchOutcome {
            answer,
            confidence,
            sources,
            route: QueryRoute::PerfStore,
            perf: Some(perf),
            chunks,
            clarification: None,
        }
    }

    async fn search_contextual(
        &self,
        query: &str,
        decision: &RouteDecision,
        language: Language,
    ) -> SearchOutcome {
        let chunks = match self.retriever.retrieve(query, &decision.filters, DEFAULT_TOP_K).await {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::error!("vector retrieval failed: {}", e);
                return self.apology(QueryRoute::Vector, language);
            },
        };

        if chunks.is_empty() {
            return self.apology(QueryRoute::Vector, language);
        }

        // Loose performance enrichment when the question leans quantitative.
        let perf = if decision.concepts.performance > 0.3 {
            let loose = PerfQuery {
                species: decision.filters.species.clone(),
                line: decision.filters.line.clone(),
                sex: decision.filters.sex,
                ..Default::default()
            };
            self.perf_store.query(&loose).await.ok()
        } else {
            None
        };

        let context_block = format_chunks(&chunks);
        let perf_block = perf
            .as_ref()
            .map(|p| format!("\nREFERENCE TABLE:\n{}", format_perf_rows(p)))
            .unwrap_or_default();
        let user_prompt = format!(
            "Answer the question from the retrieved context.\n\
             QUESTION: {query}\n\nRELEVANT CONTEXT:\n{context_block}{perf_block}\n\n\
             Provide an informative, practical answer in '{lang}'.",
            lang = language.as_str()
        );

        let answer = match self.narrate(&user_prompt).await {
            Some(text) => text,
            None => fallback_from_chunks(&chunks),
        };

        let confidence = rag_confidence(&chunks);
        let mut sources = chunk_sources(&chunks);
        if let Some(p) = &perf {
            sources.extend(perf_sources(p));
        }

        SearchOutcome {
            answer,
            confidence,
            sources,
            route: QueryRoute::Vector,
            perf,
            chunks,
            clarification: None,
        }
    }

    async fn search_hybrid(
        &self,
        query: &str,
        decision: &RouteDecision,
        language: Language,
    ) -> SearchOutcome {
        let (perf_outcome, rag_outcome) = tokio::join!(
            self.search_performance(query, decision, language),
            self.search_contextual(query, decision, language)
        );

        let comparison = decision.concepts.comparison > 0.5;
        let user_prompt = if comparison {
            format!(
                "Compare the two information sets below point by point to answer the question.\n\
                 QUESTION: {query}\n\nQUANTITATIVE DATA:\n{perf}\n\nCONTEXT:\n{rag}\n\n\
                 Highlight advantages and disadvantages, then give a data-backed recommendation. \
                 Answer in '{lang}'.",
                perf = perf_outcome.answer,
                rag = rag_outcome.answer,
                lang = language.as_str()
            )
        } else {
            format!(
                "Merge the quantitative data and the contextual guidance below into one \
                 coherent answer.\n\
                 QUESTION: {query}\n\nQUANTITATIVE DATA:\n{perf}\n\nCONTEXT:\n{rag}\n\n\
                 Answer in '{lang}'.",
                perf = perf_outcome.answer,
                rag = rag_outcome.answer,
                lang = language.as_str()
            )
        };

        let answer = match self.narrate(&user_prompt).await {
            Some(text) => text,
            None => format!("{}\n\n{}", perf_outcome.answer, rag_outcome.answer),
        };

        let confidence = perf_outcome.confidence * 0.6 + rag_outcome.confidence * 0.4;
        let mut sources = perf_outcome.sources;
        sources.extend(rag_outcome.sources);

        SearchOutcome {
            answer,
            confidence,
            sources,
            route: QueryRoute::Hybrid,
            perf: perf_outcome.perf,
            chunks: rag_outcome.chunks,
            clarification: None,
        }
    }

    /// Clarify route: the questions name what the store can actually
    /// answer, so the user is not asked blind.
    async fn clarify_with_catalog(
        &self,
        _decision: &RouteDecision,
        language: Language,
    ) -> SearchOutcome {
        let catalog = self.perf_store.available_catalog().await.unwrap_or_default();

        let mut breed_question = message(language, MessageId::ClarifyBreed).to_string();
        if !catalog.lines.is_empty() {
            let lines: Vec<&str> =
                catalog.lines.iter().take(5).map(String::as_str).collect();
            breed_question = format!("{} [{}]", breed_question, lines.join(", "));
        }

        let clarification = ClarificationRequest {
            questions: vec![
                breed_question,
                message(language, MessageId::ClarifyMetric).to_string(),
            ],
            missing_fields: vec!["breed".to_string(), "metric".to_string()],
        };

        SearchOutcome {
            answer: clarification.questions.join("\n"),
            confidence: 0.9,
            sources: Vec::new(),
            route: QueryRoute::Clarify,
            perf: None,
            chunks: Vec::new(),
            clarification: Some(clarification),
        }
    }

    async fn narrate(&self, user_prompt: &str) -> Option<String> {
        if !self.completion.is_available() {
            return None;
        }
        match self.completion.chat(SYSTEM_PROMPT, user_prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!("synthesis failed, using deterministic fallback: {}", e);
                None
            },
        }
    }

    fn apology(&self, route: QueryRoute, language: Language) -> SearchOutcome {
        SearchOutcome {
            answer: message(language, MessageId::ApologyNoResults).to_string(),
            confidence: 0.2,
            sources: Vec::new(),
            route,
            perf: None,
            chunks: Vec::new(),
            clarification: None,
        }
    }
}

pub fn perf_query_from_filters(filters: &QueryFilters) -> PerfQuery {
    PerfQuery {
        species: filters.species.clone(),
        line: filters.line.clone(),
        sex: filters.sex,
        age_days: filters.age_days,
        age_range: None,
        metrics: filters.metrics.clone(),
    }
}

/// Render the result table for prompts and deterministic fallbacks.
pub fn format_perf_rows(perf: &PerfResult) -> String {
    if perf.rows.is_empty() {
        return "No rows.".to_string();
    }

    let mut out = String::from("line | sex | age_days | metric | value | unit\n");
    for row in perf.rows.iter().take(10) {
        out.push_str(&format!(
            "{} | {} | {} | {} | {} | {}\n",
            row.line,
            row.sex,
            row.age_days,
            row.metric.as_str(),
            row.value,
            row.unit
        ));
    }
    out
}

fn format_chunks(chunks: &[VectorChunk]) -> String {
    if chunks.is_empty() {
        return "None.".to_string();
    }

    chunks
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, chunk)| {
            let text: String = chunk.content.chars().take(500).collect();
            let source = if chunk.metadata.source.is_empty() {
                "internal"
            } else {
                &chunk.metadata.source
            };
            format!("Excerpt {} ({}):\n{}", i + 1, source, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn fallback_from_chunks(chunks: &[VectorChunk]) -> String {
    chunks
        .iter()
        .take(3)
        .map(|c| c.content.trim().to_string())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn rag_confidence(chunks: &[VectorChunk]) -> f64 {
    if chunks.is_empty() {
        return 0.2;
    }
    let top: Vec<f64> = chunks.iter().take(3).map(|c| c.score).collect();
    let avg = top.iter().sum::<f64>() / top.len() as f64;
    avg.clamp(0.3, 0.9)
}

fn perf_sources(perf: &PerfResult) -> Vec<AnswerSource> {
    perf.rows
        .iter()
        .take(5)
        .map(|row| AnswerSource {
            title: format!("{} {} at {}d: {}", row.line, row.sex, row.age_days, row.metric.as_str()),
            origin: "perf_store".to_string(),
            url: None,
        })
        .collect()
}

fn chunk_sources(chunks: &[VectorChunk]) -> Vec<AnswerSource> {
    chunks
        .iter()
        .take(5)
        .map(|chunk| AnswerSource {
            title: if chunk.metadata.title.is_empty() {
                "internal knowledge".to_string()
            } else {
                chunk.metadata.title.clone()
            },
            origin: if chunk.metadata.source.is_empty() {
                "vector_store".to_string()
            } else {
                chunk.metadata.source.clone()
            },
            url: if chunk.metadata.url.is_empty() { None } else { Some(chunk.metadata.url.clone()) },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricKind, PerfRow, Sex};

    #[test]
    fn perf_query_carries_all_filters() {
        let filters = QueryFilters {
            species: Some("broiler".to_string()),
            line: Some("ross_308".to_string()),
            sex: Some(Sex::Male),
            age_days: Some(35),
            metrics: vec![MetricKind::Weight],
        };
        let query = perf_query_from_filters(&filters);
        assert_eq!(query.line.as_deref(), Some("ross_308"));
        assert_eq!(query.age_days, Some(35));
        assert_eq!(query.metrics, vec![MetricKind::Weight]);
    }

    #[test]
    fn perf_rows_format_includes_units() {
        let perf = PerfResult {
            rows: vec![PerfRow {
                line: "Ross 308".to_string(),
                sex: "male".to_string(),
                age_days: 35,
                metric: MetricKind::Weight,
                value: 2235.0,
                unit: "g".to_string(),
            }],
            confidence: 0.3,
        };
        let formatted = format_perf_rows(&perf);
        assert!(formatted.contains("2235"));
        assert!(formatted.contains("| g"));
    }

    #[test]
    fn rag_confidence_clamps() {
        assert_eq!(rag_confidence(&[]), 0.2);
    }
}
