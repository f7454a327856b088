//! Vector store client.
//!
//! Speaks the Weaviate-style REST/GraphQL surface: object inserts with
//! store-side embedding, filtered `Get` queries and paged object listing.
//! Filter grammar is path/operator/value triples with `Equal` and `Like`.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::utils::{CoreError, with_retries};

const INSERT_ATTEMPTS: u32 = 3;

/// Filter operators supported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    Like,
}

impl FilterOperator {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "Equal",
            Self::Like => "Like",
        }
    }
}

#[derive(Debug, Clone)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Bool(bool),
}

/// One path/operator/value filter triple.
#[derive(Debug, Clone)]
pub struct WhereClause {
    pub path: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

impl WhereClause {
    pub fn equal_text(path: &str, value: &str) -> Self {
        Self {
            path: path.to_string(),
            operator: FilterOperator::Equal,
            value: FilterValue::Text(value.to_string()),
        }
    }

    pub fn like_text(path: &str, pattern: &str) -> Self {
        Self {
            path: path.to_string(),
            operator: FilterOperator::Like,
            value: FilterValue::Text(pattern.to_string()),
        }
    }

    fn to_graphql(&self) -> String {
        let (key, literal) = match &self.value {
            FilterValue::Text(s) => {
                ("valueText", serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()))
            },
            FilterValue::Int(i) => ("valueInt", i.to_string()),
            FilterValue::Bool(b) => ("valueBoolean", b.to_string()),
        };
        format!(
            "{{path: [\"{}\"], operator: {}, {}: {}}}",
            self.path,
            self.operator.as_str(),
            key,
            literal
        )
    }
}

/// An object returned from a `Get` query.
#[derive(Debug, Clone)]
pub struct RetrievedObject {
    pub id: String,
    /// Store-reported similarity in [0, 1]; 0 when the query had no vector.
    pub certainty: f64,
    pub properties: Value,
}

/// HTTP client for the vector store.
pub struct VectorStoreClient {
    http_client: Client,
    config: VectorStoreConfig,
}

impl VectorStoreClient {
    pub fn new(config: VectorStoreConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client, config }
    }

    pub fn external_class(&self) -> &str {
        &self.config.external_class
    }

    pub fn internal_class(&self) -> &str {
        &self.config.internal_class
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    /// Insert one object; the store generates the embedding itself.
    /// Transient failures are retried with bounded backoff; inserts are
    /// idempotent on the store side.
    pub async fn insert(&self, class: &str, properties: Value) -> Result<(), CoreError> {
        let url = format!("{}/v1/objects", self.config.url.trim_end_matches('/'));
        let body = json!({ "class": class, "properties": properties });

        with_retries("vector_store.insert", INSERT_ATTEMPTS, CoreError::is_retryable, || async {
            let response = self
                .auth(self.http_client.post(&url))
                .json(&body)
                .send()
                .await
                .map_err(|e| CoreError::VectorStore(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(CoreError::VectorStore(format!("insert failed ({status}): {text}")));
            }
            Ok(())
        })
        .await
    }

    /// Whether any object of `class` matches the clause.
    pub async fn exists_where(&self, class: &str, clause: &WhereClause) -> Result<bool, CoreError> {
        let objects = self
            .get_objects(class, &["title"], None, std::slice::from_ref(clause), 1)
            .await?;
        Ok(!objects.is_empty())
    }

    /// Filtered `Get` query, optionally near a vector.
    pub async fn get_objects(
        &self,
        class: &str,
        fields: &[&str],
        near_vector: Option<&[f64]>,
        filters: &[WhereClause],
        limit: usize,
    ) -> Result<Vec<RetrievedObject>, CoreError> {
        let mut args = Vec::new();

        if let Some(vector) = near_vector {
            let vector_literal = vector
                .iter()
                .map(|v| format!("{v:.6}"))
                .collect::<Vec<_>>()
                .join(", ");
            args.push(format!("nearVector: {{vector: [{vector_literal}]}}"));
        }

        match filters.len() {
            0 => {},
            1 => args.push(format!("where: {}", filters[0].to_graphql())),
            _ => {
                let operands =
                    filters.iter().map(WhereClause::to_graphql).collect::<Vec<_>>().join(", ");
                args.push(format!("where: {{operator: And, operands: [{operands}]}}"));
            },
        }

        args.push(format!("limit: {limit}"));

        let gql = format!(
            "{{ Get {{ {}({}) {{ {} _additional {{ id certainty }} }} }} }}",
            class,
            args.join(", "),
            fields.join(" ")
        );

        let url = format!("{}/v1/graphql", self.config.url.trim_end_matches('/'));
        let response = self
            .auth(self.http_client.post(&url))
            .json(&json!({ "query": gql }))
            .send()
            .await
            .map_err(|e| CoreError::VectorStore(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::VectorStore(format!("query failed ({status}): {text}")));
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| CoreError::VectorStore(format!("malformed query response: {e}")))?;

        if let Some(errors) = body.errors
            && !errors.is_empty()
        {
            return Err(CoreError::VectorStore(format!("query errors: {errors:?}")));
        }

        let objects = body
            .data
            .and_then(|d| d.get.and_then(|mut g| g.remove(class)))
            .unwrap_or_default();

        Ok(objects
            .into_iter()
            .map(|mut props| {
                let (id, certainty) = props
                    .as_object_mut()
                    .and_then(|map| map.remove("_additional"))
                    .map(|additional| {
                        let id = additional
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let certainty =
                            additional.get("certainty").and_then(Value::as_f64).unwrap_or(0.0);
                        (id, certainty)
                    })
                    .unwrap_or_default();
                RetrievedObject { id, certainty, properties: props }
            })
            .collect())
    }

    /// Paged listing of raw objects, used by maintenance tooling and health
    /// probes.
    pub async fn fetch_objects(
        &self,
        class: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Value>, CoreError> {
        let url = format!(
            "{}/v1/objects?class={}&limit={}&offset={}",
            self.config.url.trim_end_matches('/'),
            class,
            limit,
            offset
        );

        let response = self
            .auth(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| CoreError::VectorStore(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::VectorStore(format!("fetch failed ({status}): {text}")));
        }

        let body: ObjectsResponse = response
            .json()
            .await
            .map_err(|e| CoreError::VectorStore(format!("malformed objects response: {e}")))?;

        Ok(body.objects.into_iter().map(|o| o.properties).collect())
    }

    /// Liveness probe against the store's readiness endpoint.
    pub async fn ping(&self) -> bool {
        let url = format!("{}/v1/.well-known/ready", self.config.url.trim_end_matches('/'));
        match self.auth(self.http_client.get(&url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    errors: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    #[serde(rename = "Get")]
    get: Option<std::collections::HashMap<String, Vec<Value>>>,
}

#[derive(Debug, Deserialize)]
struct ObjectsResponse {
    #[serde(default)]
    objects: Vec<StoredObject>,
}

#[derive(Debug, Deserialize)]
struct StoredObject {
    #[serde(default)]
    properties: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_renders_graphql_triple() {
        let clause = WhereClause::equal_text("doi", "10.1/x");
        assert_eq!(
            clause.to_graphql(),
            "{path: [\"doi\"], operator: Equal, valueText: \"10.1/x\"}"
        );
    }

    #[test]
    fn like_clause_uses_like_operator() {
        let clause = WhereClause::like_text("breed", "ross*");
        assert!(clause.to_graphql().contains("operator: Like"));
    }

    #[test]
    fn text_values_are_json_escaped() {
        let clause = WhereClause::equal_text("title", "a \"quoted\" title");
        assert!(clause.to_graphql().contains("\\\"quoted\\\""));
    }
}
