//! Document ingestion into the vector store.
//!
//! Chunks an external document semantically, checks for duplicates by DOI,
//! PMID then title, and writes each chunk with enriched metadata. The store
//! generates embeddings on insert. Ingestion succeeded only when at least
//! one chunk was actually persisted.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::config::ChunkingConfig;
use crate::localization::Language;
use crate::models::{ExternalDocument, SourceType};
use crate::services::chunking::SemanticChunker;
use crate::services::vector_store::{VectorStoreClient, WhereClause};
use crate::utils::CoreError;

/// What happened to one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// At least one chunk was persisted.
    Ingested { chunks_persisted: usize },
    /// The store already holds this document.
    DuplicateSkipped,
    /// No chunk could be persisted.
    Failed,
}

impl IngestOutcome {
    pub fn is_ingested(&self) -> bool {
        matches!(self, Self::Ingested { .. })
    }
}

pub struct IngestionService {
    store: Arc<VectorStoreClient>,
    chunker: SemanticChunker,
}

impl IngestionService {
    pub fn new(store: Arc<VectorStoreClient>, chunking: ChunkingConfig) -> Self {
        Self { store, chunker: SemanticChunker::new(chunking) }
    }

    pub async fn ingest_document(
        &self,
        document: &ExternalDocument,
        query_context: &str,
        language: Language,
    ) -> Result<IngestOutcome, CoreError> {
        if self.document_exists(document).await? {
            tracing::info!("Document already ingested, skipping: {}", document.title);
            return Ok(IngestOutcome::DuplicateSkipped);
        }

        let chunks = self.chunker.chunk_document(
            &document.title,
            &document.abstract_text,
            document.full_text.as_deref(),
        );

        if chunks.is_empty() {
            tracing::warn!("Document produced no chunks: {}", document.title);
            return Ok(IngestOutcome::Failed);
        }

        let total_chunks = chunks.len();
        let mut persisted = 0usize;

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let properties = json!({
                "content": chunk.content,
                "title": document.title,
                "source": document.source,
                "source_type": SourceType::ExternalDocument.as_str(),
                "url": document.url,
                "authors": document.authors.join(", "),
                "year": document.year,
                "language": language.as_str(),
                "doi": document.doi.clone().unwrap_or_default(),
                "pmid": document.pmid.clone().unwrap_or_default(),
                "pmcid": document.pmcid.clone().unwrap_or_default(),
                "citation_count": document.citation_count,
                "journal": document.journal.clone().unwrap_or_default(),
                "ingested_from_query": query_context,
                "ingested_at": Utc::now().to_rfc3339(),
                "relevance_score": document.relevance_score,
                "composite_score": document.composite_score,
                "chunk_index": chunk_index,
                "total_chunks": total_chunks,
                "is_first_chunk": chunk_index == 0,
                "is_last_chunk": chunk_index == total_chunks - 1,
            });

            match self.store.insert(self.store.external_class(), properties).await {
                Ok(()) => persisted += 1,
                Err(e) => {
                    tracing::error!(
                        "Failed to persist chunk {}/{} of '{}': {}",
                        chunk_index + 1,
                        total_chunks,
                        document.title,
                        e
                    );
                },
            }
        }

        if persisted > 0 {
            tracing::info!(
                "Ingested {}/{} chunks for '{}'",
                persisted,
                total_chunks,
                document.title
            );
            Ok(IngestOutcome::Ingested { chunks_persisted: persisted })
        } else {
            Ok(IngestOutcome::Failed)
        }
    }

    /// Duplicate check, keyed in order on DOI, PMID, then exact title.
    async fn document_exists(&self, document: &ExternalDocument) -> Result<bool, CoreError> {
        let clause = if let Some(doi) = document.doi.as_ref().filter(|d| !d.is_empty()) {
            WhereClause::equal_text("doi", doi)
        } else if let Some(pmid) = document.pmid.as_ref().filter(|p| !p.is_empty()) {
            WhereClause::equal_text("pmid", pmid)
        } else {
            WhereClause::equal_text("title", &document.title)
        };

        self.store.exists_where(self.store.external_class(), &clause).await
    }
}
