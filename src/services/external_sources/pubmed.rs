//! PubMed adapter.
//!
//! Two-step E-utilities flow: `esearch` for PMIDs, then `esummary` for the
//! records. An API key lifts the shared rate limit from 3 to 10 rps.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::models::ExternalDocument;
use crate::utils::CoreError;

use super::fetcher::{FetcherBase, SourceFetcher};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const ESUMMARY_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";

pub struct PubMedFetcher {
    base: FetcherBase,
}

impl PubMedFetcher {
    pub fn new(config: &SourceConfig) -> Self {
        Self { base: FetcherBase::new("pubmed", 1.0, config) }
    }

    fn push_key(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(key) = &self.base.api_key {
            params.push(("api_key", key.clone()));
        }
    }
}

#[async_trait]
impl SourceFetcher for PubMedFetcher {
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
        let term = format!("({query}) AND {min_year}:3000[dp]");
        let mut search_params = vec![
            ("db", "pubmed".to_string()),
            ("term", term),
            ("retmax", max_results.to_string()),
            ("retmode", "json".to_string()),
            ("sort", "relevance".to_string()),
        ];
        self.push_key(&mut search_params);

        let search_body = self.base.get_json(ESEARCH_URL, &search_params).await?;
        let ids = parse_search_ids(&search_body);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut summary_params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "json".to_string()),
        ];
        self.push_key(&mut summary_params);

        let summary_body = self.base.get_json(ESUMMARY_URL, &summary_params).await?;
        Ok(parse_summaries(&summary_body, &ids))
    }
}

pub fn parse_search_ids(body: &Value) -> Vec<String> {
    body.get("esearchresult")
        .and_then(|r| r.get("idlist"))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter().filter_map(Value::as_str).map(str::to_string).collect()
        })
        .unwrap_or_default()
}

pub fn parse_summaries(body: &Value, ids: &[String]) -> Vec<ExternalDocument> {
    let result = match body.get("result") {
        Some(r) => r,
        None => return Vec::new(),
    };

    ids.iter()
        .filter_map(|id| {
            let record = result.get(id)?;
            let title = record.get("title").and_then(Value::as_str)?.to_string();

            let year = record
                .get("pubdate")
                .and_then(Value::as_str)
                .and_then(|d| d.split_whitespace().next())
                .and_then(|y| y.parse::<i32>().ok())
                .unwrap_or(0);

            let authors = record
                .get("authors")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|a| a.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let doi = record
                .get("articleids")
                .and_then(Value::as_array)
                .and_then(|list| {
                    list.iter().find(|aid| {
                        aid.get("idtype").and_then(Value::as_str) == Some("doi")
                    })
                })
                .and_then(|aid| aid.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string);

            Some(ExternalDocument {
                title,
                abstract_text: String::new(),
                authors,
                year,
                source: "pubmed".to_string(),
                url: format!("https://pubmed.ncbi.nlm.nih.gov/{id}/"),
                doi,
                pmid: Some(id.clone()),
                pmcid: None,
                journal: record
                    .get("fulljournalname")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                citation_count: 0,
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
    fn parses_esearch_ids() {
        let body = json!({"esearchresult": {"idlist": ["111", "222"]}});
        assert_eq!(parse_search_ids(&body), vec!["111".to_string(), "222".to_string()]);
    }

    #[test]
    fn parses_esummary_records() {
        let ids = vec!["111".to_string()];
        let body = json!({
            "result": {
                "111": {
                    "title": "Coccidiosis control in broilers",
                    "pubdate": "2021 Mar",
                    "fulljournalname": "Veterinary Parasitology",
                    "authors": [{"name": "B. Vet"}],
                    "articleids": [{"idtype": "doi", "value": "10.2/xyz"}]
                }
            }
        });

        let docs = parse_summaries(&body, &ids);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].pmid.as_deref(), Some("111"));
        assert_eq!(docs[0].doi.as_deref(), Some("10.2/xyz"));
        assert_eq!(docs[0].year, 2021);
        assert!(docs[0].url.contains("111"));
    }
}
