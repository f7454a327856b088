//! External source fan-out, deduplication and composite ranking.
//!
//! One concurrent task per enabled source, each self-regulated by its own
//! token bucket. A failing source never cancels its peers; partial results
//! degrade the outcome instead of erroring it. Dropping the in-flight
//! search future aborts all source tasks.

pub mod europe_pmc;
pub mod fao;
pub mod fetcher;
pub mod pubmed;
pub mod semantic_scholar;

pub use europe_pmc::EuropePmcFetcher;
pub use fao::FaoFetcher;
pub use fetcher::{SourceFetcher, TokenBucket};
pub use pubmed::PubMedFetcher;
pub use semantic_scholar::SemanticScholarFetcher;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Datelike;
use tokio::task::JoinSet;

use crate::config::{RankingConfig, SourcesConfig};
use crate::models::{ExternalDocument, ExternalSearchResult};
use crate::services::completion::{CompletionClient, cosine_similarity};

/// Relevance assigned to every document when embeddings are unavailable.
const FALLBACK_RELEVANCE: f64 = 0.5;
/// How many ranked documents the result carries.
const TOP_DOCUMENTS: usize = 5;

pub struct ExternalSourceManager {
    sources: Vec<Arc<dyn SourceFetcher>>,
    completion: Arc<CompletionClient>,
    ranking: RankingConfig,
    max_results_per_source: usize,
    min_year: i32,
}

impl ExternalSourceManager {
    pub fn from_config(
        config: &SourcesConfig,
        ranking: RankingConfig,
        completion: Arc<CompletionClient>,
    ) -> Self {
        let mut sources: Vec<Arc<dyn SourceFetcher>> = Vec::new();

        if config.semantic_scholar.enabled {
            sources.push(Arc::new(SemanticScholarFetcher::new(&config.semantic_scholar)));
        }
        if config.pubmed.enabled {
            sources.push(Arc::new(PubMedFetcher::new(&config.pubmed)));
        }
        if config.europe_pmc.enabled {
            sources.push(Arc::new(EuropePmcFetcher::new(&config.europe_pmc)));
        }
        if config.fao.enabled {
            sources.push(Arc::new(FaoFetcher::new(&config.fao)));
        }

        tracing::info!(
            "External source manager initialized with {} sources: {:?}",
            sources.len(),
            sources.iter().map(|s| s.name()).collect::<Vec<_>>()
        );

        Self {
            sources,
            completion,
            ranking,
            max_results_per_source: config.max_results_per_source,
            min_year: config.min_year,
        }
    }

    /// Construct from explicit sources; the config path above ends here too.
    pub fn with_sources(
        sources: Vec<Arc<dyn SourceFetcher>>,
        completion: Arc<CompletionClient>,
        ranking: RankingConfig,
        max_results_per_source: usize,
        min_year: i32,
    ) -> Self {
        Self { sources, completion, ranking, max_results_per_source, min_year }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Search all enabled sources in parallel, deduplicate, score and rank.
    ///
    /// Never fails for partial source failures; `found=false` only when all
    /// sources failed or returned nothing.
    pub async fn search(&self, query: &str) -> ExternalSearchResult {
        let start = Instant::now();
        let sources_searched = self.sources.len();

        if sources_searched == 0 {
            return ExternalSearchResult::empty(query, 0, elapsed_ms(start));
        }

        tracing::info!("Searching {} external sources for: '{}'", sources_searched, query);

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let query = query.to_string();
            let max_results = self.max_results_per_source;
            let min_year = self.min_year;
            tasks.spawn(async move {
                let result = source.search(&query, max_results, min_year).await;
                (source.name(), result)
            });
        }

        let mut all_docs: Vec<ExternalDocument> = Vec::new();
        let mut sources_succeeded = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(docs))) => {
                    if docs.is_empty() {
                        tracing::debug!("Source {} returned no documents", name);
                    } else {
                        tracing::debug!("Source {} returned {} documents", name, docs.len());
                        sources_succeeded += 1;
                        all_docs.extend(docs);
                    }
                },
                Ok((name, Err(e))) => {
                    tracing::warn!("Source {} failed: {}", name, e);
                },
                Err(e) => {
                    tracing::warn!("Source task aborted: {}", e);
                },
            }
        }

        tracing::info!(
            "{}/{} sources succeeded, found {} total documents",
            sources_succeeded,
            sources_searched,
            all_docs.len()
        );

        if all_docs.is_empty() {
            let mut result = ExternalSearchResult::empty(query, sources_searched, elapsed_ms(start));
            result.sources_succeeded = sources_succeeded;
            return result;
        }

        let total_results = all_docs.len();
        let mut unique = deduplicate(all_docs);
        let unique_results = unique.len();
        tracing::debug!("Deduplication: {} -> {} unique", total_results, unique_results);

        self.score_relevance(&mut unique, query).await;

        let source_weights: HashMap<String, f64> = self
            .sources
            .iter()
            .map(|s| (s.name().to_string(), s.weight()))
            .collect();
        rank_documents(&mut unique, &self.ranking, &source_weights, chrono::Utc::now().year());

        ExternalSearchResult {
            found: true,
            best_document: unique.first().cloned(),
            all_documents: unique.into_iter().take(TOP_DOCUMENTS).collect(),
            sources_searched,
            sources_succeeded,
            total_results,
            unique_results,
            search_duration_ms: elapsed_ms(start),
            query: query.to_string(),
            error: None,
        }
    }

    /// One query embedding, one batch of document embeddings. On any
    /// failure every document keeps the neutral fallback relevance.
    async fn score_relevance(&self, documents: &mut [ExternalDocument], query: &str) {
        for doc in documents.iter_mut() {
            doc.relevance_score = FALLBACK_RELEVANCE;
        }

        let query_embedding = match self.completion.embed(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!("Relevance scoring skipped (query embedding failed): {}", e);
                return;
            },
        };

        let texts: Vec<String> = documents.iter().map(|d| d.embedding_text()).collect();
        let doc_embeddings = match self.completion.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::warn!("Relevance scoring skipped (batch embedding failed): {}", e);
                return;
            },
        };

        for (doc, embedding) in documents.iter_mut().zip(doc_embeddings.iter()) {
            doc.relevance_score = cosine_similarity(&query_embedding, embedding);
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Drop duplicate documents across sources. Stage one matches the
/// `doi:`/`pmid:`/`pmcid:` prefixed identity, stage two the normalized
/// title plus year; a third, semantic stage is reserved. First occurrence
/// wins.
pub fn deduplicate(documents: Vec<ExternalDocument>) -> Vec<ExternalDocument> {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<(String, i32)> = HashSet::new();
    let mut unique = Vec::with_capacity(documents.len());

    for doc in documents {
        let unique_id = doc.unique_id();
        if !unique_id.starts_with("title:") {
            if seen_ids.contains(&unique_id) {
                tracing::debug!("Duplicate (id): {}", doc.title);
                continue;
            }
            seen_ids.insert(unique_id);
        }

        let title_key = (doc.title.to_lowercase().trim().to_string(), doc.year);
        if seen_titles.contains(&title_key) {
            tracing::debug!("Duplicate (title+year): {}", doc.title);
            continue;
        }
        seen_titles.insert(title_key);

        unique.push(doc);
    }

    unique
}

/// Recency score buckets relative to the current year.
pub fn recency_score(year: i32, current_year: i32) -> f64 {
    if year >= current_year {
        1.0
    } else if year >= current_year - 4 {
        0.8
    } else if year >= current_year - 9 {
        0.5
    } else {
        0.2
    }
}

/// Citations per publication year, normalized against the best-cited
/// document of the batch. The denominator is clamped to one citation per
/// year so a zero-citation batch cannot divide by zero.
pub fn citation_score(citations: u32, max_citations: u32, years_since_pub: i32) -> f64 {
    let years = years_since_pub.max(1) as f64;
    let per_year = citations as f64 / years;
    let max_per_year = (max_citations as f64 / years).max(1.0);
    (per_year / max_per_year).min(1.0)
}

/// Compute composite scores in place and sort descending. Ties break on
/// title so identical inputs always produce the identical order.
pub fn rank_documents(
    documents: &mut [ExternalDocument],
    weights: &RankingConfig,
    source_weights: &HashMap<String, f64>,
    current_year: i32,
) {
    let max_citations = documents.iter().map(|d| d.citation_count).max().unwrap_or(0);

    for doc in documents.iter_mut() {
        let years_since_pub = current_year - doc.year;
        let citation = citation_score(doc.citation_count, max_citations, years_since_pub);
        let recency = recency_score(doc.year, current_year);
        let source = source_weights.get(&doc.source).copied().unwrap_or(0.5);

        doc.composite_score = doc.relevance_score * weights.relevance_weight
            + citation * weights.citation_weight
            + recency * weights.recency_weight
            + source * weights.source_weight;
    }

    documents.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.title.cmp(&b.title))
    });

    if let Some(best) = documents.first() {
        tracing::debug!(
            "Top document: '{}' (score={:.3}, relevance={:.3}, citations={})",
            best.title,
            best.composite_score,
            best.relevance_score,
            best.citation_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::utils::CoreError;
    use async_trait::async_trait;

    fn doc(title: &str, year: i32, doi: Option<&str>, source: &str) -> ExternalDocument {
        ExternalDocument {
            title: title.to_string(),
            abstract_text: "broiler nutrition study".to_string(),
            authors: vec![],
            year,
            source: source.to_string(),
            url: String::new(),
            doi: doi.map(str::to_string),
            pmid: None,
            pmcid: None,
            journal: None,
            citation_count: 0,
            language: "en".to_string(),
            full_text: None,
            relevance_score: 0.0,
            composite_score: 0.0,
        }
    }

    struct FakeSource {
        name: &'static str,
        docs: Vec<ExternalDocument>,
        fail: bool,
    }

    #[async_trait]
    impl SourceFetcher for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn weight(&self) -> f64 {
            1.0
        }

        async fn search(
            &self,
            _query: &str,
            _max_results: usize,
            _min_year: i32,
        ) -> Result<Vec<ExternalDocument>, CoreError> {
            if self.fail {
                Err(CoreError::Source("timeout".to_string()))
            } else {
                Ok(self.docs.clone())
            }
        }
    }

    fn offline_completion() -> Arc<CompletionClient> {
        // No API key: embedding calls fail fast and relevance falls back.
        Arc::new(CompletionClient::new(ProviderConfig::default()))
    }

    fn manager(sources: Vec<Arc<dyn SourceFetcher>>) -> ExternalSourceManager {
        ExternalSourceManager::with_sources(
            sources,
            offline_completion(),
            RankingConfig::default(),
            5,
            2015,
        )
    }

    #[test]
    fn dedup_drops_shared_doi_then_title_year() {
        let docs = vec![
            doc("A study", 2020, Some("10.1/a"), "pubmed"),
            doc("A Study Retitled", 2020, Some("10.1/a"), "europe_pmc"),
            doc("Same Title", 2021, None, "pubmed"),
            doc("same title", 2021, None, "europe_pmc"),
            doc("Same Title", 2019, None, "europe_pmc"),
        ];

        let unique = deduplicate(docs);
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn dedup_is_idempotent() {
        let docs = vec![
            doc("One", 2020, Some("10.1/a"), "pubmed"),
            doc("Two", 2021, None, "fao"),
        ];
        let once = deduplicate(docs);
        let twice = deduplicate(once.clone());
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn recency_buckets() {
        assert_eq!(recency_score(2025, 2025), 1.0);
        assert_eq!(recency_score(2021, 2025), 0.8);
        assert_eq!(recency_score(2016, 2025), 0.5);
        assert_eq!(recency_score(2010, 2025), 0.2);
    }

    #[test]
    fn citation_score_handles_zero_citation_batch() {
        // A current-year batch with zero citations must not divide by zero.
        assert_eq!(citation_score(0, 0, 0), 0.0);
        assert!(citation_score(10, 10, 1) <= 1.0);
        assert!(citation_score(5, 10, 5) > 0.0);
    }

    #[test]
    fn ranking_sorts_descending_and_deterministically() {
        let mut docs = vec![
            doc("Old uncited", 2012, None, "fao"),
            doc("Fresh cited", 2024, None, "pubmed"),
        ];
        docs[1].citation_count = 40;
        docs[0].relevance_score = 0.5;
        docs[1].relevance_score = 0.5;

        let weights = RankingConfig::default();
        let source_weights =
            HashMap::from([("pubmed".to_string(), 1.0), ("fao".to_string(), 0.8)]);
        rank_documents(&mut docs, &weights, &source_weights, 2025);

        assert_eq!(docs[0].title, "Fresh cited");
        assert!(docs[0].composite_score >= docs[1].composite_score);
    }

    #[tokio::test]
    async fn zero_sources_short_circuits() {
        let result = manager(vec![]).search("broiler heat stress").await;
        assert!(!result.found);
        assert_eq!(result.sources_searched, 0);
        assert_eq!(result.total_results, 0);
    }

    #[tokio::test]
    async fn one_failing_source_degrades_but_does_not_fail() {
        let shared = doc("Shared Paper", 2022, Some("10.9/shared"), "pubmed");
        let mut shared_other = shared.clone();
        shared_other.source = "europe_pmc".to_string();

        let source_a: Vec<ExternalDocument> = (0..4)
            .map(|i| doc(&format!("A{i}"), 2020 + i, None, "pubmed"))
            .chain([shared])
            .collect();
        let source_b: Vec<ExternalDocument> = (0..4)
            .map(|i| doc(&format!("B{i}"), 2020 + i, None, "europe_pmc"))
            .chain([shared_other])
            .collect();

        let sources: Vec<Arc<dyn SourceFetcher>> = vec![
            Arc::new(FakeSource { name: "pubmed", docs: source_a, fail: false }),
            Arc::new(FakeSource { name: "europe_pmc", docs: source_b, fail: false }),
            Arc::new(FakeSource { name: "timeouting", docs: vec![], fail: true }),
        ];

        let result = manager(sources).search("broiler nutrition").await;

        assert!(result.found);
        assert_eq!(result.sources_searched, 3);
        assert_eq!(result.sources_succeeded, 2);
        assert_eq!(result.total_results, 10);
        assert_eq!(result.unique_results, 9);

        // The shared-DOI paper appears exactly once in the ranked output.
        let shared_count = result
            .all_documents
            .iter()
            .filter(|d| d.doi.as_deref() == Some("10.9/shared"))
            .count();
        assert!(shared_count <= 1);

        // Sorted descending by composite score.
        for pair in result.all_documents.windows(2) {
            assert!(pair[0].composite_score >= pair[1].composite_score);
        }

        // Fallback relevance applied without a provider.
        assert!(result.all_documents.iter().all(|d| d.relevance_score == 0.5));

        let best = result.best_document.expect("best document");
        assert!(
            result
                .all_documents
                .iter()
                .any(|d| d.unique_id() == best.unique_id())
        );
    }
}
