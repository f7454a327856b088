//! Agent layer over the hybrid engine.
//!
//! Classifies question complexity, decomposes complex questions into flat
//! subqueries executed concurrently through the hybrid engine, and
//! synthesizes the set into one answer. Questions whose shape needs real
//! dependency structure are delegated to the multi-step orchestrator
//! before flat decomposition is considered. Any failure on the decomposed
//! path falls back to a single-shot hybrid search.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinSet;

use crate::localization::Language;
use crate::models::{ExtractedEntities, Intent, QueryRoute, StepResult};
use crate::services::completion::CompletionClient;
use crate::services::hybrid_search::{HybridSearchEngine, SearchOutcome};
use crate::services::orchestrator::MultiStepOrchestrator;
use crate::utils::strip_diacritics;

/// Sub-answers below this confidence are dropped before synthesis.
const MIN_SUB_CONFIDENCE: f64 = 0.3;

/// Question complexity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryComplexity {
    Simple,
    MultiMetric,
    Comparative,
    Conditional,
    Sequential,
    Diagnostic,
}

impl QueryComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::MultiMetric => "multi_metric",
            Self::Comparative => "comparative",
            Self::Conditional => "conditional",
            Self::Sequential => "sequential",
            Self::Diagnostic => "diagnostic",
        }
    }
}

/// One decomposed subquery.
#[derive(Debug, Clone)]
pub struct SubQuery {
    pub query: String,
    pub intent: Intent,
    pub priority: u8,
}

static RE_MULTI_METRIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(poids|fcr|eau|aliment|weight|water|feed)\b.*\b(et|and)\b.*\b(poids|fcr|eau|aliment|weight|water|feed)\b")
        .expect("multi metric regex")
});
static RE_COMPARATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(ross|cobb|hubbard)\b.*\b(vs|versus|contre|par rapport|compared)\b|\b(difference|comparer|compare|comparison)\b.*\b(lignee|souche|breed|line|strain)\b|\b(meilleur|better)\b.*\b(que|than)\b",
    )
    .expect("comparative regex")
});
static RE_CONDITIONAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bsi\b.*\b(alors|donc)\b|\bif\b.*\b(then|what)\b").expect("conditional regex")
});
static RE_SEQUENTIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:etape|step)\s*\d|d abord.*ensuite|first.*then").expect("sequential regex")
});
static RE_CAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(pourquoi|why|por que|cause|origine|reason)\b").expect("cause regex"));

const METRIC_WORDS: &[(&str, &str)] = &[
    ("poids", "weight"),
    ("weight", "weight"),
    ("fcr", "fcr"),
    ("eau", "water intake"),
    ("water", "water intake"),
    ("aliment", "feed intake"),
    ("feed", "feed intake"),
];

pub struct AgentRag {
    hybrid: Arc<HybridSearchEngine>,
    orchestrator: Arc<MultiStepOrchestrator>,
    completion: Arc<CompletionClient>,
}

impl AgentRag {
    pub fn new(
        hybrid: Arc<HybridSearchEngine>,
        orchestrator: Arc<MultiStepOrchestrator>,
        completion: Arc<CompletionClient>,
    ) -> Self {
        Self { hybrid, orchestrator, completion }
    }

    /// Answer a question, decomposing when the complexity calls for it.
    pub async fn answer(
        &self,
        query: &str,
        intent: Intent,
        entities: &ExtractedEntities,
        language: Language,
    ) -> SearchOutcome {
        // Dependency-shaped questions go through the step DAG first.
        if MultiStepOrchestrator::has_dependency_pattern(query) {
            let orchestration = self.orchestrator.run(query, entities).await;
            if orchestration.success && orchestration.final_result.is_some() {
                return self.outcome_from_orchestration(query, orchestration, language).await;
            }
            tracing::warn!(
                "orchestration failed ({}), falling back to single-shot search",
                orchestration.error.as_deref().unwrap_or("no final result")
            );
            return self.hybrid.search(query, intent, entities, language).await;
        }

        let complexity = classify_complexity(query, entities);
        tracing::info!("query complexity: {}", complexity.as_str());

        if complexity == QueryComplexity::Simple {
            return self.hybrid.search(query, intent, entities, language).await;
        }

        let sub_queries = decompose(query, intent, entities, complexity, language);
        if sub_queries.len() <= 1 {
            return self.hybrid.search(query, intent, entities, language).await;
        }

        let mut tasks = JoinSet::new();
        for sub in &sub_queries {
            let hybrid = Arc::clone(&self.hybrid);
            let sub = sub.clone();
            let entities = entities.clone();
            tasks.spawn(async move {
                hybrid.search(&sub.query, sub.intent, &entities, language).await
            });
        }

        // Synthesis consumes the set as a whole, so arrival order is
        // irrelevant to the final answer.
        let mut sub_results: Vec<SearchOutcome> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => sub_results.push(outcome),
                Err(e) => tracing::warn!("subquery task failed: {}", e),
            }
        }

        let mut valid: Vec<SearchOutcome> = sub_results
            .into_iter()
            .filter(|r| r.confidence > MIN_SUB_CONFIDENCE && !r.answer.is_empty())
            .collect();
        valid.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
        });

        if valid.is_empty() {
            tracing::warn!("no usable subquery results, falling back to single-shot search");
            return self.hybrid.search(query, intent, entities, language).await;
        }

        self.synthesize(query, complexity, valid, language).await
    }

    async fn synthesize(
        &self,
        query: &str,
        complexity: QueryComplexity,
        sub_results: Vec<SearchOutcome>,
        language: Language,
    ) -> SearchOutcome {
        let confidence = sub_results.iter().map(|r| r.confidence).sum::<f64>()
            / sub_results.len() as f64;

        let mut sources = Vec::new();
        for result in &sub_results {
            sources.extend(result.sources.iter().cloned());
        }
        sources.truncate(10);

        let user_prompt = build_synthesis_prompt(query, complexity, &sub_results, language);
        let system = "You are a poultry production expert synthesizing partial findings \
            into one coherent answer. Use only the provided material.";

        let answer = if self.completion.is_available() {
            match self.completion.chat(system, &user_prompt).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("synthesis failed, concatenating sub-answers: {}", e);
                    concatenate(&sub_results)
                },
            }
        } else {
            concatenate(&sub_results)
        };

        SearchOutcome {
            answer,
            confidence,
            sources,
            route: QueryRoute::Hybrid,
            perf: None,
            chunks: sub_results.into_iter().flat_map(|r| r.chunks).collect(),
            clarification: None,
        }
    }

    /// Turn an orchestration result into an answer, narrated when the
    /// provider is up, rendered deterministically otherwise.
    async fn outcome_from_orchestration(
        &self,
        query: &str,
        orchestration: crate::models::OrchestrationResult,
        language: Language,
    ) -> SearchOutcome {
        let rendered = render_final_result(orchestration.final_result.as_ref());

        let answer = if self.completion.is_available() {
            let user_prompt = format!(
                "Present these computed flock figures as a clear answer to the question.\n\
                 QUESTION: {query}\n\nCOMPUTED RESULTS:\n{rendered}\n\n\
                 Keep every number exactly as given. Answer in '{}'.",
                language.as_str()
            );
            match self
                .completion
                .chat("You are a poultry production expert.", &user_prompt)
                .await
            {
                Ok(text) => text,
                Err(_) => rendered.clone(),
            }
        } else {
            rendered.clone()
        };

        SearchOutcome {
            answer,
            confidence: 0.85,
            sources: vec![crate::models::AnswerSource {
                title: format!("{}-step calculation", orchestration.steps_executed),
                origin: "perf_store".to_string(),
                url: None,
            }],
            route: QueryRoute::PerfStore,
            perf: None,
            chunks: Vec::new(),
            clarification: None,
        }
    }
}

/// Classify a question's complexity from patterns, entity counts and
/// length.
pub fn classify_complexity(query: &str, entities: &ExtractedEntities) -> QueryComplexity {
    let lowered = strip_diacritics(&query.to_lowercase());

    if !entities.symptoms.is_empty() && RE_CAUSE.is_match(&lowered) {
        return QueryComplexity::Diagnostic;
    }
    if RE_COMPARATIVE.is_match(&lowered) {
        return QueryComplexity::Comparative;
    }
    if RE_CONDITIONAL.is_match(&lowered) {
        return QueryComplexity::Conditional;
    }
    if RE_SEQUENTIAL.is_match(&lowered) {
        return QueryComplexity::Sequential;
    }
    if RE_MULTI_METRIC.is_match(&lowered) {
        return QueryComplexity::MultiMetric;
    }

    if entities.known_field_count() >= 4 {
        return QueryComplexity::MultiMetric;
    }

    let words = lowered.split_whitespace().count();
    if words > 20 && (lowered.contains(" et ") || lowered.contains(" and ")) {
        return QueryComplexity::MultiMetric;
    }

    QueryComplexity::Simple
}

/// Decompose by complexity into flat subqueries (no inter-dependencies;
/// dependent structure lives in the orchestrator).
pub fn decompose(
    query: &str,
    intent: Intent,
    entities: &ExtractedEntities,
    complexity: QueryComplexity,
    language: Language,
) -> Vec<SubQuery> {
    let lowered = strip_diacritics(&query.to_lowercase());

    match complexity {
        QueryComplexity::MultiMetric => decompose_multi_metric(&lowered, entities, language),
        QueryComplexity::Comparative => decompose_comparative(query, &lowered, entities),
        QueryComplexity::Conditional => decompose_conditional(query, &lowered),
        QueryComplexity::Diagnostic => decompose_diagnostic(query, language),
        _ => vec![SubQuery { query: query.to_string(), intent, priority: 1 }],
    }
}

fn decompose_multi_metric(
    lowered: &str,
    entities: &ExtractedEntities,
    language: Language,
) -> Vec<SubQuery> {
    let mut metrics: Vec<&str> = Vec::new();
    for (word, metric) in METRIC_WORDS {
        if lowered.contains(word) && !metrics.contains(metric) {
            metrics.push(metric);
        }
    }

    let breed = entities.breed.as_ref().map(|b| b.value.clone()).unwrap_or_default();
    let age = entities.age_days.as_ref().map(|a| a.value.to_string()).unwrap_or_default();

    metrics
        .iter()
        .map(|metric| {
            let query = match language {
                Language::Fr => {
                    format!("Quelle est la valeur optimale de {metric} pour {breed} a {age} jours ?")
                },
                Language::Es => {
                    format!("Cual es el valor optimo de {metric} para {breed} a {age} dias?")
                },
                Language::En => {
                    format!("What is the optimal {metric} for {breed} at {age} days?")
                },
            };
            SubQuery { query, intent: Intent::MetricQuery, priority: 1 }
        })
        .collect()
}

fn decompose_comparative(
    query: &str,
    lowered: &str,
    entities: &ExtractedEntities,
) -> Vec<SubQuery> {
    let mut lines: Vec<String> = ["ross", "cobb", "hubbard"]
        .iter()
        .filter(|line| lowered.contains(*line))
        .map(|line| line.to_string())
        .collect();

    // A single named line compares against the industry standard.
    if lines.len() < 2 {
        if let Some(breed) = &entities.breed {
            lines = vec![breed.value.clone(), "industry standard".to_string()];
        }
    }

    let base_question = query.split("vs").next().unwrap_or(query).trim();

    lines
        .iter()
        .map(|line| SubQuery {
            query: format!("{base_question} for {line}"),
            intent: Intent::MetricQuery,
            priority: 1,
        })
        .collect()
}

fn decompose_conditional(query: &str, lowered: &str) -> Vec<SubQuery> {
    let (keyword, then_word) = if lowered.contains("si ") { ("si ", "alors") } else { ("if ", "then") };

    // Slice the normalized text only; byte offsets into the original would
    // drift once diacritics were stripped.
    if let Some(pos) = lowered.find(keyword) {
        let tail = &lowered[pos + keyword.len()..];
        let (condition, action) = match tail.find(then_word) {
            Some(split) => (tail[..split].trim(), tail[split + then_word.len()..].trim()),
            None => (tail.trim(), ""),
        };

        let mut subs = vec![SubQuery {
            query: format!("Normal conditions for: {condition}"),
            intent: Intent::MetricQuery,
            priority: 1,
        }];
        if !action.is_empty() {
            subs.push(SubQuery {
                query: format!("Recommended actions: {action}"),
                intent: Intent::ProtocolQuery,
                priority: 2,
            });
        }
        return subs;
    }

    vec![SubQuery { query: query.to_string(), intent: Intent::GeneralPoultry, priority: 1 }]
}

fn decompose_diagnostic(query: &str, language: Language) -> Vec<SubQuery> {
    let (signs, causes, protocol) = match language {
        Language::Fr => (
            format!("Signes cliniques et symptomes observes: {query}"),
            "Causes possibles des symptomes decrits".to_string(),
            "Protocole d'action pour ces symptomes".to_string(),
        ),
        Language::Es => (
            format!("Signos clinicos y sintomas observados: {query}"),
            "Causas posibles de los sintomas descritos".to_string(),
            "Protocolo de accion para estos sintomas".to_string(),
        ),
        Language::En => (
            format!("Clinical signs and observed symptoms: {query}"),
            "Possible causes of the described symptoms".to_string(),
            "Action protocol for these symptoms".to_string(),
        ),
    };

    vec![
        SubQuery { query: signs, intent: Intent::DiagnosisTriage, priority: 1 },
        SubQuery { query: causes, intent: Intent::DiagnosisTriage, priority: 2 },
        SubQuery { query: protocol, intent: Intent::ProtocolQuery, priority: 3 },
    ]
}

fn build_synthesis_prompt(
    query: &str,
    complexity: QueryComplexity,
    sub_results: &[SearchOutcome],
    language: Language,
) -> String {
    let mut material = String::new();
    for (i, result) in sub_results.iter().enumerate() {
        material.push_str(&format!(
            "\nFINDING {} (confidence {:.2}):\n{}\n",
            i + 1,
            result.confidence,
            result.answer
        ));
    }

    let instructions = match complexity {
        QueryComplexity::MultiMetric => {
            "Group the findings by metric, give target values and normal \
             ranges per metric, and order them by practical priority."
        },
        QueryComplexity::Comparative => {
            "Compare the findings point by point, highlight advantages and \
             disadvantages, and close with a data-backed recommendation."
        },
        QueryComplexity::Diagnostic => {
            "Produce a structured differential: ranked probable causes, then \
             the examinations to run, then the immediate action plan."
        },
        _ => "Synthesize the findings into one precise, practical answer.",
    };

    format!(
        "QUESTION: {query}\n\nFINDINGS:{material}\n\nINSTRUCTIONS: {instructions} \
         Answer in '{}', at most 400 words.",
        language.as_str()
    )
}

fn concatenate(sub_results: &[SearchOutcome]) -> String {
    sub_results
        .iter()
        .take(3)
        .map(|r| r.answer.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_final_result(result: Option<&StepResult>) -> String {
    match result {
        Some(StepResult::FlockTotals(totals)) => format!(
            "initial flock: {} birds\nsurviving birds: {}\ndead birds: {}\n\
             mortality: {}%\ntotal live weight: {:.1} kg\ntotal feed consumed: {:.1} kg\n\
             average FCR: {:.2}",
            totals.flock_size_initial,
            totals.surviving_birds,
            totals.dead_birds,
            totals.mortality_pct,
            totals.total_live_weight_kg,
            totals.total_feed_consumed_kg,
            totals.avg_fcr
        ),
        Some(StepResult::Comparison(cmp)) => format!(
            "base scenario: {:.1} kg live weight, {:.1} kg feed\n\
             modified scenario: {:.1} kg live weight, {:.1} kg feed\n\
             weight difference: {:+.1} kg\nfeed difference: {:+.1} kg",
            cmp.base.total_live_weight_kg,
            cmp.base.total_feed_consumed_kg,
            cmp.modified.total_live_weight_kg,
            cmp.modified.total_feed_consumed_kg,
            cmp.weight_diff_kg,
            cmp.feed_diff_kg
        ),
        Some(StepResult::Aggregate(agg)) => agg
            .metrics
            .iter()
            .map(|m| format!("{}: {:.1} {}", m.metric.as_str(), m.value, m.unit))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(StepResult::Compromise(c)) => format!(
            "compromise age: {} days (from {} objectives)",
            c.compromise_age_days,
            c.individual_optimals.len()
        ),
        Some(StepResult::Optimization(o)) => format!(
            "optimal age for {}: {} days (value {:.2})",
            o.objective.as_str(),
            o.optimal_age_days,
            o.value_at_optimum
        ),
        Some(StepResult::Performance(p)) => format!(
            "weight: {:.0} g, FCR: {:.2}, feed intake: {:.0} g",
            p.weight_g, p.fcr, p.intake_g
        ),
        Some(StepResult::Metric(m)) => {
            format!("{}: {:.1} {}", m.metric.as_str(), m.value, m.unit)
        },
        None => "no result".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scored;
    use crate::services::intent::extract_tier1;

    fn classify(query: &str) -> QueryComplexity {
        let (_, entities) = extract_tier1(query);
        classify_complexity(query, &entities)
    }

    #[test]
    fn plain_metric_question_is_simple() {
        assert_eq!(classify("Target weight for Ross 308 at 35 days?"), QueryComplexity::Simple);
    }

    #[test]
    fn weight_and_water_is_multi_metric() {
        assert_eq!(
            classify("What weight and water consumption should I expect?"),
            QueryComplexity::MultiMetric
        );
    }

    #[test]
    fn ross_versus_cobb_is_comparative() {
        assert_eq!(
            classify("Ross 308 versus Cobb 500, which grows faster?"),
            QueryComplexity::Comparative
        );
    }

    #[test]
    fn if_then_is_conditional() {
        assert_eq!(
            classify("If the barn temperature drops then what should I do?"),
            QueryComplexity::Conditional
        );
    }

    #[test]
    fn symptoms_with_why_are_diagnostic() {
        assert_eq!(
            classify("Pourquoi cette diarrhée et cette léthargie dans mon lot ?"),
            QueryComplexity::Diagnostic
        );
    }

    #[test]
    fn many_entities_escalate_to_multi_metric() {
        let entities = ExtractedEntities {
            breed: Some(Scored::new("ross_308".to_string(), 0.9)),
            age_days: Some(Scored::new(35, 0.9)),
            flock_size: Some(Scored::new(5000, 0.8)),
            mortality_pct: Some(Scored::new(3.0, 0.9)),
            ..Default::default()
        };
        assert_eq!(
            classify_complexity("a short question", &entities),
            QueryComplexity::MultiMetric
        );
    }

    #[test]
    fn multi_metric_decomposition_yields_one_subquery_per_metric() {
        let entities = ExtractedEntities {
            breed: Some(Scored::new("ross_308".to_string(), 0.9)),
            age_days: Some(Scored::new(35, 0.9)),
            ..Default::default()
        };
        let subs = decompose(
            "quel poids et quelle eau pour mon lot",
            Intent::MetricQuery,
            &entities,
            QueryComplexity::MultiMetric,
            Language::Fr,
        );
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|s| s.intent == Intent::MetricQuery));
    }

    #[test]
    fn comparative_decomposition_builds_one_query_per_line() {
        let (_, entities) = extract_tier1("FCR Ross 308 vs Cobb 500 at 42 days");
        let subs = decompose(
            "FCR Ross 308 vs Cobb 500 at 42 days",
            Intent::MetricQuery,
            &entities,
            QueryComplexity::Comparative,
            Language::En,
        );
        assert_eq!(subs.len(), 2);
        assert!(subs[0].query.contains("ross"));
        assert!(subs[1].query.contains("cobb"));
    }

    #[test]
    fn diagnostic_decomposition_has_three_prioritized_steps() {
        let subs = decompose(
            "pourquoi cette mortalité ?",
            Intent::DiagnosisTriage,
            &ExtractedEntities::default(),
            QueryComplexity::Diagnostic,
            Language::Fr,
        );
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].priority, 1);
        assert_eq!(subs[2].intent, Intent::ProtocolQuery);
    }

    #[test]
    fn conditional_decomposition_splits_condition_and_action() {
        let subs = decompose(
            "if the temperature drops then increase the feed",
            Intent::GeneralPoultry,
            &ExtractedEntities::default(),
            QueryComplexity::Conditional,
            Language::En,
        );
        assert_eq!(subs.len(), 2);
        assert!(subs[0].query.to_lowercase().contains("temperature"));
        assert!(subs[1].query.to_lowercase().contains("feed"));
    }

    #[test]
    fn render_totals_keeps_exact_numbers() {
        let rendered = render_final_result(Some(&StepResult::FlockTotals(
            crate::models::FlockTotals {
                flock_size_initial: 10_000,
                surviving_birds: 9_500,
                dead_birds: 500,
                mortality_pct: 5.0,
                total_live_weight_kg: 26_600.0,
                total_feed_consumed_kg: 46_200.0,
                avg_fcr: 1.65,
            },
        )));
        assert!(rendered.contains("9500"));
        assert!(rendered.contains("26600.0"));
    }
}
