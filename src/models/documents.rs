//! External documents and vector-store chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a chunk originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Internal,
    ExternalDocument,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::ExternalDocument => "external_document",
        }
    }
}

/// A document returned by an external academic source.
///
/// `composite_score` is only meaningful after the source manager has ranked
/// the batch it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDocument {
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub year: i32,
    /// Adapter name (`semantic_scholar`, `pubmed`, `europe_pmc`, `fao`).
    pub source: String,
    pub url: String,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub journal: Option<String>,
    pub citation_count: u32,
    pub language: String,
    pub full_text: Option<String>,
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub composite_score: f64,
}

impl ExternalDocument {
    /// Dedup identity: DOI first, then PMID, then PMCID, else normalized
    /// title plus year.
    pub fn unique_id(&self) -> String {
        if let Some(doi) = self.doi.as_ref().filter(|d| !d.is_empty()) {
            return format!("doi:{}", doi.to_lowercase());
        }
        if let Some(pmid) = self.pmid.as_ref().filter(|p| !p.is_empty()) {
            return format!("pmid:{pmid}");
        }
        if let Some(pmcid) = self.pmcid.as_ref().filter(|p| !p.is_empty()) {
            return format!("pmcid:{pmcid}");
        }
        format!("title:{}|{}", self.title.to_lowercase().trim(), self.year)
    }

    /// Text embedded for relevance scoring: title plus the first 500
    /// characters of the abstract.
    pub fn embedding_text(&self) -> String {
        let abstract_head: String = self.abstract_text.chars().take(500).collect();
        format!("{}. {}", self.title, abstract_head)
    }
}

/// Outcome of one fan-out search across the enabled sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSearchResult {
    pub found: bool,
    pub best_document: Option<ExternalDocument>,
    /// Top five, sorted by composite score descending.
    pub all_documents: Vec<ExternalDocument>,
    pub sources_searched: usize,
    pub sources_succeeded: usize,
    pub total_results: usize,
    pub unique_results: usize,
    pub search_duration_ms: u64,
    pub query: String,
    pub error: Option<String>,
}

impl ExternalSearchResult {
    pub fn empty(query: &str, sources_searched: usize, duration_ms: u64) -> Self {
        Self {
            found: false,
            best_document: None,
            all_documents: Vec::new(),
            sources_searched,
            sources_succeeded: 0,
            total_results: 0,
            unique_results: 0,
            search_duration_ms: duration_ms,
            query: query.to_string(),
            error: Some("No documents found in any source".to_string()),
        }
    }
}

/// Metadata carried by every ingested chunk. Enough to reconstruct
/// document-level coherence without refetching the source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub source: String,
    pub source_type: SourceType,
    pub url: String,
    pub authors: String,
    pub year: i32,
    pub language: String,
    pub doi: String,
    pub pmid: String,
    pub pmcid: String,
    pub citation_count: u32,
    pub journal: String,
    pub breed: Option<String>,
    pub species: Option<String>,
    pub phase: Option<String>,
    pub age_band: Option<String>,
    pub ingested_from_query: String,
    pub ingested_at: Option<DateTime<Utc>>,
    pub relevance_score: f64,
    pub composite_score: f64,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub is_first_chunk: bool,
    pub is_last_chunk: bool,
}

/// One chunk returned by the vector retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorChunk {
    pub chunk_id: String,
    pub content: String,
    /// Similarity of this chunk to the query embedding.
    pub score: f64,
    pub metadata: ChunkMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(doi: Option<&str>, pmid: Option<&str>, pmcid: Option<&str>) -> ExternalDocument {
        ExternalDocument {
            title: "Broiler Growth".to_string(),
            abstract_text: String::new(),
            authors: vec![],
            year: 2022,
            source: "pubmed".to_string(),
            url: String::new(),
            doi: doi.map(str::to_string),
            pmid: pmid.map(str::to_string),
            pmcid: pmcid.map(str::to_string),
            journal: None,
            citation_count: 0,
            language: "en".to_string(),
            full_text: None,
            relevance_score: 0.0,
            composite_score: 0.0,
        }
    }

    #[test]
    fn unique_id_prefers_doi_then_pmid_then_pmcid() {
        assert_eq!(
            doc(Some("10.1/ABC"), Some("123"), None).unique_id(),
            "doi:10.1/abc"
        );
        assert_eq!(doc(None, Some("123"), Some("PMC9")).unique_id(), "pmid:123");
        assert_eq!(doc(None, None, Some("PMC9")).unique_id(), "pmcid:PMC9");
        assert_eq!(doc(None, None, None).unique_id(), "title:broiler growth|2022");
    }

    #[test]
    fn embedding_text_truncates_abstract() {
        let mut d = doc(None, None, None);
        d.abstract_text = "x".repeat(900);
        let text = d.embedding_text();
        assert!(text.len() <= d.title.len() + 2 + 500);
    }
}
