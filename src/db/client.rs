use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::toolkit::query_builder::StructuredQuery;
use crate::utils::elapsed_ms;


const MAX_RETRIES: u32 = 3;

const INITIAL_RETRY_DELAY_MS: u64 = 20;

const MAX_RETRY_DELAY_MS: u64 = 200;


#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("Search backend unavailable: {0}")]
    Unavailable(String),
    #[error("Search backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Invalid search response: {0}")]
    Decode(String),
    #[error("Retry exhausted after {0} attempts: {1}")]
    RetryExhausted(u32, String),
}

impl ExecutionError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) | Self::RetryExhausted(..) => false,
        }
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Unavailable(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}


/// What the search backend reports back. Only `result_count` drives the
/// pipeline; the result set is passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub result_count: usize,
    pub result_set: Vec<serde_json::Value>,
    pub latency_ms: u64,
}


/// The search-execution collaborator.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionResult, ExecutionError>;
}


#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result_count: Option<usize>,
    #[serde(default, alias = "results", alias = "hits")]
    result_set: Vec<serde_json::Value>,
    #[serde(default, alias = "took_ms")]
    latency_ms: Option<u64>,
}


/// POSTs the structured query as JSON to `{base_url}/search`.
pub struct HttpSearchExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSearchExecutor {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        let base_url = base_url.trim_end_matches('/').to_string();
        info!("HttpSearchExecutor created for {}", base_url);
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute_once(&self, query: &StructuredQuery) -> Result<ExecutionResult, ExecutionError> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Status {
                status: status.as_u16(),
                body: crate::safe_truncate(&body, 200),
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ExecutionError::Decode(e.to_string()))?;
        Ok(ExecutionResult {
            result_count: parsed.result_count.unwrap_or(parsed.result_set.len()),
            result_set: parsed.result_set,
            latency_ms: parsed.latency_ms.unwrap_or_else(|| elapsed_ms(start)),
        })
    }
}

#[async_trait]
impl SearchExecutor for HttpSearchExecutor {
    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionResult, ExecutionError> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS);

        for attempt in 1..=MAX_RETRIES {
            debug!("Executing search (attempt {})", attempt);

            match self.execute_once(query).await {
                Ok(result) => {
                    debug!("Search returned {} results", result.result_count);
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        debug!("Search failed (attempt {}), retrying: {}", attempt, e);
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(Duration::from_millis(MAX_RETRY_DELAY_MS));
                    } else {
                        warn!("Search failed (final attempt {}): {}", attempt, e);
                    }
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(ExecutionError::RetryExhausted(
            MAX_RETRIES,
            last_error.unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }
}
