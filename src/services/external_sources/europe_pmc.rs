//! Europe PMC adapter.
//!
//! REST search with `resultType=core` so abstracts come back in the same
//! call. Peer-reviewed plus some grey literature, weighted slightly below
//! the primary biomedical sources.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::models::ExternalDocument;
use crate::utils::CoreError;

use super::fetcher::{FetcherBase, SourceFetcher};

const API_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

pub struct EuropePmcFetcher {
    base: FetcherBase,
}

impl EuropePmcFetcher {
    pub fn new(config: &SourceConfig) -> Self {
        Self { base: FetcherBase::new("europe_pmc", 0.9, config) }
    }
}

#[async_trait]
impl SourceFetcher for EuropePmcFetcher {
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
            ("query", format!("({query}) AND PUB_YEAR:[{min_year} TO 3000]")),
            ("format", "json".to_string()),
            ("resultType", "core".to_string()),
            ("pageSize", max_results.to_string()),
        ];

        let body = self.base.get_json(API_URL, &params).await?;
        Ok(parse_response(&body))
    }
}

pub fn parse_response(body: &Value) -> Vec<ExternalDocument> {
    let results = body
        .get("resultList")
        .and_then(|l| l.get("result"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    results
        .iter()
        .filter_map(|record| {
            let title = record.get("title").and_then(Value::as_str)?.to_string();
            let year = record
                .get("pubYear")
                .and_then(Value::as_str)
                .and_then(|y| y.parse::<i32>().ok())
                .unwrap_or(0);

            let authors = record
                .get("authorString")
                .and_then(Value::as_str)
                .map(|s| s.split(", ").map(str::to_string).collect())
                .unwrap_or_default();

            let pmid = record.get("pmid").and_then(Value::as_str).map(str::to_string);
            let url = pmid
                .as_ref()
                .map(|p| format!("https://europepmc.org/abstract/MED/{p}"))
                .unwrap_or_default();

            Some(ExternalDocument {
                title,
                abstract_text: record
                    .get("abstractText")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                authors,
                year,
                source: "europe_pmc".to_string(),
                url,
                doi: record.get("doi").and_then(Value::as_str).map(str::to_string),
                pmid,
                pmcid: record.get("pmcid").and_then(Value::as_str).map(str::to_string),
                journal: record
                    .get("journalInfo")
                    .and_then(|j| j.get("journal"))
                    .and_then(|j| j.get("title"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                citation_count: record
                    .get("citedByCount")
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
    fn parses_core_results() {
        let body = json!({
            "resultList": {
                "result": [{
                    "title": "Gut health in layers",
                    "pubYear": "2020",
                    "authorString": "C. One, D. Two",
                    "pmid": "555",
                    "pmcid": "PMC555",
                    "doi": "10.3/def",
                    "citedByCount": 7,
                    "abstractText": "Microbiota...",
                    "journalInfo": {"journal": {"title": "Avian Diseases"}}
                }]
            }
        });

        let docs = parse_response(&body);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].pmcid.as_deref(), Some("PMC555"));
        assert_eq!(docs[0].citation_count, 7);
        assert_eq!(docs[0].authors.len(), 2);
        assert_eq!(docs[0].journal.as_deref(), Some("Avian Diseases"));
    }
}
