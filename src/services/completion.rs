//! Completion provider client - HTTP client for OpenAI-compatible APIs.
//!
//! Uses reqwest to call the chat-completion and embedding endpoints.
//! Responses are consumed whole; streaming is never relied upon.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ProviderConfig;

/// Completion provider errors.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider API error: {0}")]
    ApiError(String),

    #[error("provider response parsing error: {0}")]
    ParseError(String),

    #[error("provider timeout after {0}s")]
    Timeout(u64),

    #[error("provider rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("completion provider disabled")]
    Disabled,
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::ApiError(_))
    }
}

/// Completion provider HTTP client.
pub struct CompletionClient {
    http_client: Client,
    config: ProviderConfig,
}

impl CompletionClient {
    pub fn new(config: ProviderConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1) * 2))
            .build()
            .expect("Failed to create HTTP client");

        Self { http_client, config }
    }

    /// Whether provider-backed paths may be attempted at all.
    pub fn is_available(&self) -> bool {
        self.config.enabled && self.config.api_key.is_some()
    }

    pub fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::Disabled);
        }
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::ApiError("API key not configured".to_string()))
    }

    /// Call the chat completion API with a system and a user message, and
    /// return the raw text of the first choice.
    pub async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        self.chat_with_format(system_prompt, user_prompt, None).await
    }

    /// Same as [`chat`](Self::chat) but forcing a JSON object response.
    pub async fn chat_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        self.chat_with_format(
            system_prompt,
            user_prompt,
            Some(ResponseFormat { r#type: "json_object".to_string() }),
        )
        .await
    }

    async fn chat_with_format(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        response_format: Option<ResponseFormat>,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;

        let chat_request = ChatCompletionRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
                ChatMessage { role: "user".to_string(), content: user_prompt.to_string() },
            ],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            response_format,
        };

        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));

        tracing::debug!("Calling provider: {} with model {}", url, self.config.chat_model);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.config.timeout_secs)
                } else {
                    ProviderError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ProviderError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::ParseError("Empty response from provider".to_string()))
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f64>, ProviderError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::ParseError("Empty embedding response".to_string()))
    }

    /// Embed a batch of texts in one request; order is preserved.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, ProviderError> {
        let api_key = self.api_key()?;

        let url = format!("{}/embeddings", self.config.api_base.trim_end_matches('/'));

        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.config.timeout_secs)
                } else {
                    ProviderError::ApiError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!("API error {}: {}", status, error_text)));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(ProviderError::ParseError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        let mut data = body.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Cosine similarity between two vectors; 0.0 when either is degenerate.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|y| y * y).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.2, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn client_without_key_is_unavailable() {
        let client = CompletionClient::new(ProviderConfig::default());
        assert!(!client.is_available());
    }
}
