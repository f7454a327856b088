//! Source adapter plumbing: the fetcher trait, per-source token bucket and
//! the shared HTTP request path with bounded retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::SourceConfig;
use crate::models::ExternalDocument;
use crate::utils::{CoreError, with_retries};

/// One external academic source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Stable adapter name used in document metadata and logs.
    fn name(&self) -> &'static str;

    /// Source reputation in [0, 1], used by the composite ranking.
    fn weight(&self) -> f64;

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        min_year: i32,
    ) -> Result<Vec<ExternalDocument>, CoreError>;
}

/// Token bucket limiting one source's request rate.
///
/// Refill is continuous at `rps`; capacity is the burst size. `acquire`
/// suspends until a token is available, so a source can never exceed its
/// configured rate no matter how the manager schedules it.
pub struct TokenBucket {
    capacity: f64,
    refill_rps: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rps: f64, burst: u32) -> Self {
        let capacity = (burst.max(1)) as f64;
        Self {
            capacity,
            refill_rps: rps.max(0.01),
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_rps).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rps)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Shared state and request path for the concrete adapters.
pub struct FetcherBase {
    name: &'static str,
    weight: f64,
    http_client: Client,
    bucket: TokenBucket,
    max_retries: u32,
    timeout: Duration,
    pub api_key: Option<String>,
}

impl FetcherBase {
    pub fn new(name: &'static str, weight: f64, config: &SourceConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent("gallus/1.0 (poultry research retrieval)")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name,
            weight,
            http_client,
            bucket: TokenBucket::new(config.rate_limit_rps, config.burst),
            max_retries: config.max_retries,
            timeout,
            api_key: config.api_key.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Rate-limited GET returning parsed JSON, retried on transport errors.
    pub async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, CoreError> {
        with_retries(self.name, self.max_retries, CoreError::is_retryable, || async {
            self.bucket.acquire().await;

            let response = self
                .http_client
                .get(url)
                .query(params)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| CoreError::Source(format!("{}: {}", self.name, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(CoreError::Source(format!("{}: HTTP {}", self.name, status)));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| CoreError::Parse(format!("{}: {}", self.name, e)))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bucket_allows_burst_then_throttles() {
        tokio::time::pause();
        let bucket = TokenBucket::new(10.0, 2);

        // Burst capacity drains instantly.
        bucket.acquire().await;
        bucket.acquire().await;

        // The third acquire needs a refill tick; with a paused clock the
        // sleep auto-advances, so this stays fast while still exercising
        // the wait path.
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn bucket_never_exceeds_capacity() {
        tokio::time::pause();
        let bucket = TokenBucket::new(100.0, 1);
        tokio::time::advance(Duration::from_secs(60)).await;

        // One minute of refill still leaves a single token of capacity.
        bucket.acquire().await;
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
