//! Semantic Scholar adapter.
//!
//! Graph API paper search. Large academic coverage with citation counts,
//! so it carries full reputation weight.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::models::ExternalDocument;
use crate::utils::CoreError;

use super::fetcher::{FetcherBase, SourceFetcher};

const API_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "title,abstract,authors,year,citationCount,externalIds,url,venue";

pub struct SemanticScholarFetcher {
    base: FetcherBase,
}

impl SemanticScholarFetcher {
    pub fn new(config: &SourceConfig) -> Self {
        Self { base: FetcherBase::new("semantic_scholar", 1.0, config) }
    }
}

#[async_trait]
impl SourceFetcher for SemanticScholarFetcher {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    fn weight(&self) -> f64 {
        self.base.weight()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        min_year: i32,
    ) -> Result<Vec<ExternalDocument>, CoreError> {
        let params = [
            ("query", query.to_string()),
            ("limit", max_results.to_string()),
            ("fields", FIELDS.to_string()),
            ("year", format!("{min_year}-")),
        ];

        let body = self.base.get_json(API_URL, &params).await?;
        Ok(parse_response(&body, min_year))
    }
}

/// Parse a Graph API search response into documents.
pub fn parse_response(body: &Value, min_year: i32) -> Vec<ExternalDocument> {
    let papers = body.get("data").and_then(Value::as_array).cloned().unwrap_or_default();

    papers
        .iter()
        .filter_map(|paper| {
            let title = paper.get("title")?.as_str()?.to_string();
            let year = paper.get("year").and_then(Value::as_i64).unwrap_or(0) as i32;
            if year < min_year {
                return None;
            }

            let external_ids = paper.get("externalIds");
            let doi = external_ids
                .and_then(|ids| ids.get("DOI"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let pmid = external_ids
                .and_then(|ids| ids.get("PubMed"))
                .and_then(Value::as_str)
                .map(str::to_string);

            let authors = paper
                .get("authors")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|a| a.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            Some(ExternalDocument {
                title,
                abstract_text: paper
                    .get("abstract")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                authors,
                year,
                source: "semantic_scholar".to_string(),
                url: paper.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
                doi,
                pmid,
                pmcid: None,
                journal: paper.get("venue").and_then(Value::as_str).map(str::to_string),
                citation_count: paper
                    .get("citationCount")
                    .and_then(Value::as_i64)
                    .unwrap_or(0)
                    .max(0) as u32,
                language: "en".to_string(),
                full_text: None,
                relevance_score: 0.0,
                composite_score: 0.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_papers_and_filters_old_years() {
        let body = json!({
            "data": [
                {
                    "title": "Heat stress in broilers",
                    "abstract": "Effects of temperature...",
                    "year": 2022,
                    "citationCount": 34,
                    "url": "https://example.org/p1",
                    "venue": "Poultry Science",
                    "externalIds": {"DOI": "10.1/abc", "PubMed": "123"},
                    "authors": [{"name": "A. Researcher"}]
                },
                {
                    "title": "Ancient paper",
                    "year": 2001
                }
            ]
        });

        let docs = parse_response(&body, 2015);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doi.as_deref(), Some("10.1/abc"));
        assert_eq!(docs[0].pmid.as_deref(), Some("123"));
        assert_eq!(docs[0].citation_count, 34);
        assert_eq!(docs[0].authors, vec!["A. Researcher".to_string()]);
    }

    #[test]
    fn empty_body_parses_to_nothing() {
        assert!(parse_response(&json!({}), 2015).is_empty());
    }
}
