use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::safe_truncate;


#[derive(Error, Debug)]
pub enum LlmProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} returned no completion")]
    EmptyCompletion(&'static str),
}

impl LlmProviderError {
    /// Reads a failed response into a `Status` error, keeping a short body.
    pub(crate) async fn from_response(provider: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Status {
            provider,
            status,
            body: safe_truncate(&body, 200),
        }
    }
}


/// Classification and expansion both ask for one JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    #[default]
    Text,
    JsonObject,
}


#[derive(Debug, Clone, Copy)]
pub struct Prompt<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub mode: ResponseMode,
}

impl<'a> Prompt<'a> {
    pub fn json(system: &'a str, user: &'a str) -> Self {
        Self {
            system,
            user,
            mode: ResponseMode::JsonObject,
        }
    }
}


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt + self.completion
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub latency_ms: u64,
}


/// Chat message shape shared by the Ollama and OpenAI-style APIs.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub(crate) fn for_prompt(prompt: &Prompt<'_>) -> Vec<Self> {
        vec![
            Self {
                role: "system".to_string(),
                content: prompt.system.to_string(),
            },
            Self {
                role: "user".to_string(),
                content: prompt.user.to_string(),
            },
        ]
    }
}


#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: Prompt<'_>) -> Result<Completion, LlmProviderError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}
