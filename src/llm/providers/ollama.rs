use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::base::{ChatMessage, Completion, LlmProvider, LlmProviderError, Prompt, ResponseMode, TokenUsage};
use crate::utils::elapsed_ms;

const PROVIDER: &str = "ollama";

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: Options,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: Option<ChatMessage>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

impl ChatReply {
    fn into_completion(self, model: &str, latency_ms: u64) -> Result<Completion, LlmProviderError> {
        let content = self
            .message
            .map(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmProviderError::EmptyCompletion(PROVIDER))?;
        Ok(Completion {
            content,
            provider: PROVIDER.to_string(),
            model: model.to_string(),
            usage: Some(TokenUsage {
                prompt: self.prompt_eval_count,
                completion: self.eval_count,
            }),
            latency_ms,
        })
    }
}


/// Chat provider for a self-hosted Ollama server. Serves the low-cost tier and
/// the local fallback model.
pub struct OllamaProvider {
    base_url: String,
    model: String,
    temperature: f64,
    client: Client,
}

impl OllamaProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f64,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        info!("Ollama provider initialized (model={}, url={})", model, base_url);
        Self {
            base_url,
            model,
            temperature,
            client: Client::builder().timeout(timeout).build().unwrap_or_default(),
        }
    }

    fn body<'a>(&'a self, prompt: &Prompt<'_>) -> ChatBody<'a> {
        ChatBody {
            model: &self.model,
            messages: ChatMessage::for_prompt(prompt),
            stream: false,
            options: Options {
                temperature: self.temperature,
            },
            format: (prompt.mode == ResponseMode::JsonObject).then_some("json"),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, prompt: Prompt<'_>) -> Result<Completion, LlmProviderError> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&self.body(&prompt))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LlmProviderError::from_response(PROVIDER, response).await);
        }
        let reply: ChatReply = response.json().await?;
        reply.into_completion(&self.model, elapsed_ms(start))
    }

    fn provider_name(&self) -> &str {
        PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
