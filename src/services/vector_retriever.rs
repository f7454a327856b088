//! Vector retriever - embedding-based top-k retrieval with metadata filters.

use std::sync::Arc;

use serde_json::Value;

use crate::models::{ChunkMetadata, QueryFilters, SourceType, VectorChunk};
use crate::services::completion::CompletionClient;
use crate::services::vector_store::{RetrievedObject, VectorStoreClient, WhereClause};
use crate::utils::CoreError;

pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 50;

/// Properties requested for every chunk query.
const CHUNK_FIELDS: &[&str] = &[
    "content",
    "title",
    "source",
    "source_type",
    "url",
    "authors",
    "year",
    "language",
    "doi",
    "pmid",
    "pmcid",
    "citation_count",
    "journal",
    "breed",
    "species",
    "phase",
    "age_band",
    "ingested_from_query",
    "relevance_score",
    "composite_score",
    "chunk_index",
    "total_chunks",
    "is_first_chunk",
    "is_last_chunk",
];

pub struct VectorRetriever {
    store: Arc<VectorStoreClient>,
    completion: Arc<CompletionClient>,
}

impl VectorRetriever {
    pub fn new(store: Arc<VectorStoreClient>, completion: Arc<CompletionClient>) -> Self {
        Self { store, completion }
    }

    /// Retrieve the `top_k` most similar chunks across the internal and
    /// external classes, with filters applied store-side.
    pub async fn retrieve(
        &self,
        query_text: &str,
        filters: &QueryFilters,
        top_k: usize,
    ) -> Result<Vec<VectorChunk>, CoreError> {
        let top_k = top_k.clamp(1, MAX_TOP_K);

        let embedding = self
            .completion
            .embed(query_text)
            .await
            .map_err(|e| CoreError::Embedding(e.to_string()))?;

        let clauses = build_filter_clauses(filters);

        let mut chunks = Vec::new();
        for class in [self.store.internal_class().to_string(), self.store.external_class().to_string()]
        {
            match self
                .store
                .get_objects(&class, CHUNK_FIELDS, Some(&embedding), &clauses, top_k)
                .await
            {
                Ok(objects) => {
                    chunks.extend(objects.into_iter().map(chunk_from_object));
                },
                Err(e) => {
                    tracing::warn!("vector retrieval failed for class {}: {}", class, e);
                },
            }
        }

        if chunks.is_empty() {
            // Distinguish "both classes errored" from "nothing matched":
            // retry the internal class without filters to surface a real
            // store failure.
            if !clauses.is_empty() {
                let unfiltered = self
                    .store
                    .get_objects(
                        self.store.internal_class(),
                        CHUNK_FIELDS,
                        Some(&embedding),
                        &[],
                        top_k,
                    )
                    .await?;
                chunks.extend(unfiltered.into_iter().map(chunk_from_object));
            } else {
                self.store
                    .get_objects(
                        self.store.internal_class(),
                        CHUNK_FIELDS,
                        Some(&embedding),
                        &[],
                        1,
                    )
                    .await?;
            }
        }

        chunks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        chunks.truncate(top_k);
        Ok(chunks)
    }
}

fn build_filter_clauses(filters: &QueryFilters) -> Vec<WhereClause> {
    let mut clauses = Vec::new();
    if let Some(species) = &filters.species {
        clauses.push(WhereClause::equal_text("species", species));
    }
    if let Some(line) = &filters.line {
        clauses.push(WhereClause::like_text("breed", &format!("*{line}*")));
    }
    clauses
}

fn chunk_from_object(object: RetrievedObject) -> VectorChunk {
    let props = &object.properties;
    let source_type = match str_prop(props, "source_type").as_str() {
        "external_document" => SourceType::ExternalDocument,
        _ => SourceType::Internal,
    };

    VectorChunk {
        chunk_id: object.id,
        content: str_prop(props, "content"),
        score: object.certainty,
        metadata: ChunkMetadata {
            title: str_prop(props, "title"),
            source: str_prop(props, "source"),
            source_type,
            url: str_prop(props, "url"),
            authors: str_prop(props, "authors"),
            year: int_prop(props, "year") as i32,
            language: str_prop(props, "language"),
            doi: str_prop(props, "doi"),
            pmid: str_prop(props, "pmid"),
            pmcid: str_prop(props, "pmcid"),
            citation_count: int_prop(props, "citation_count").max(0) as u32,
            journal: str_prop(props, "journal"),
            breed: opt_str_prop(props, "breed"),
            species: opt_str_prop(props, "species"),
            phase: opt_str_prop(props, "phase"),
            age_band: opt_str_prop(props, "age_band"),
            ingested_from_query: str_prop(props, "ingested_from_query"),
            ingested_at: None,
            relevance_score: f64_prop(props, "relevance_score"),
            composite_score: f64_prop(props, "composite_score"),
            chunk_index: int_prop(props, "chunk_index").max(0) as usize,
            total_chunks: int_prop(props, "total_chunks").max(0) as usize,
            is_first_chunk: bool_prop(props, "is_first_chunk"),
            is_last_chunk: bool_prop(props, "is_last_chunk"),
        },
    }
}

fn str_prop(props: &Value, key: &str) -> String {
    props.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn opt_str_prop(props: &Value, key: &str) -> Option<String> {
    props.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

fn int_prop(props: &Value, key: &str) -> i64 {
    props.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn f64_prop(props: &Value, key: &str) -> f64 {
    props.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn bool_prop(props: &Value, key: &str) -> bool {
    props.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chunk_parsing_reads_metadata_invariants() {
        let object = RetrievedObject {
            id: "abc".to_string(),
            certainty: 0.83,
            properties: json!({
                "content": "Broilers need 32C during brooding.",
                "title": "Brooding guide",
                "source": "pubmed",
                "source_type": "external_document",
                "year": 2021,
                "citation_count": 12,
                "chunk_index": 0,
                "total_chunks": 3,
                "is_first_chunk": true,
                "is_last_chunk": false
            }),
        };

        let chunk = chunk_from_object(object);
        assert_eq!(chunk.score, 0.83);
        assert_eq!(chunk.metadata.source_type, SourceType::ExternalDocument);
        assert_eq!(chunk.metadata.chunk_index, 0);
        assert!(chunk.metadata.is_first_chunk);
        assert!(!chunk.metadata.is_last_chunk);
    }

    #[test]
    fn filters_become_where_clauses() {
        let filters = QueryFilters {
            species: Some("broiler".to_string()),
            line: Some("ross_308".to_string()),
            ..Default::default()
        };
        let clauses = build_filter_clauses(&filters);
        assert_eq!(clauses.len(), 2);
    }
}
