//! FAO adapter.
//!
//! Practical guidelines and reports, authoritative but not peer-reviewed,
//! hence the lowest reputation weight. The query is focused on poultry
//! terms and excludes other livestock so the broad FAO corpus doesn't
//! drown the results. Disabled by default.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::models::ExternalDocument;
use crate::utils::CoreError;

use super::fetcher::{FetcherBase, SourceFetcher};

const API_URL: &str = "https://www.fao.org/faolex/api/results";

const POULTRY_FOCUS: &str = "poultry OR chicken OR broiler OR layer OR avian";
const EXCLUDE_TERMS: &str = "-cattle -bovine -dairy -pig -swine";

pub struct FaoFetcher {
    base: FetcherBase,
}

impl FaoFetcher {
    pub fn new(config: &SourceConfig) -> Self {
        Self { base: FetcherBase::new("fao", 0.8, config) }
    }
}

#[async_trait]
impl SourceFetcher for FaoFetcher {
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
            ("q", format!("{query} ({POULTRY_FOCUS}) {EXCLUDE_TERMS}")),
            ("limit", max_results.min(50).to_string()),
        ];

        let body = self.base.get_json(API_URL, &params).await?;
        Ok(parse_response(&body, min_year))
    }
}

pub fn parse_response(body: &Value, min_year: i32) -> Vec<ExternalDocument> {
    let records = body.get("records").and_then(Value::as_array).cloned().unwrap_or_default();

    records
        .iter()
        .filter_map(|record| {
            let title = record.get("title").and_then(Value::as_str)?.to_string();
            let year = record
                .get("year")
                .and_then(Value::as_i64)
                .or_else(|| {
                    record
                        .get("year")
                        .and_then(Value::as_str)
                        .and_then(|y| y.parse::<i64>().ok())
                })
                .unwrap_or(0) as i32;
            if year < min_year {
                return None;
            }

            Some(ExternalDocument {
                title,
                abstract_text: record
                    .get("summary")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                authors: vec!["FAO".to_string()],
                year,
                source: "fao".to_string(),
                url: record.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
                doi: None,
                pmid: None,
                pmcid: None,
                journal: None,
                citation_count: 0,
                language: record
                    .get("language")
                    .and_then(Value::as_str)
                    .unwrap_or("en")
                    .to_string(),
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
    fn parses_records_and_filters_by_year() {
        let body = json!({
            "records": [
                {"title": "Poultry production guideline", "year": 2019, "url": "https://fao.org/g1"},
                {"title": "Old bulletin", "year": "1998"}
            ]
        });

        let docs = parse_response(&body, 2015);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source, "fao");
        assert_eq!(docs[0].authors, vec!["FAO".to_string()]);
    }
}
