use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::base::{ChatMessage, Completion, LlmProvider, LlmProviderError, Prompt, ResponseMode, TokenUsage};
use crate::utils::elapsed_ms;

const CEREBRAS_BASE_URL: &str = "https://api.cerebras.ai/v1";
const PROVIDER: &str = "cerebras";

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl ChatReply {
    fn into_completion(self, model: &str, latency_ms: u64) -> Result<Completion, LlmProviderError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmProviderError::EmptyCompletion(PROVIDER))?;
        Ok(Completion {
            content,
            provider: PROVIDER.to_string(),
            model: model.to_string(),
            usage: self.usage.map(|u| TokenUsage {
                prompt: u.prompt_tokens,
                completion: u.completion_tokens,
            }),
            latency_ms,
        })
    }
}


/// OpenAI-compatible chat-completions provider (Cerebras by default); serves
/// the high-capability tier.
pub struct CerebrasProvider {
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    client: Client,
}

impl CerebrasProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<String>,
        model: impl Into<String>,
        temperature: f64,
        timeout: Duration,
    ) -> Self {
        let model = model.into();
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| CEREBRAS_BASE_URL.to_string());
        info!("Cerebras provider initialized (model={}, url={})", model, base_url);
        Self {
            api_key: api_key.into(),
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
            temperature: self.temperature,
            response_format: (prompt.mode == ResponseMode::JsonObject)
                .then_some(ResponseFormat { r#type: "json_object" }),
        }
    }
}

#[async_trait]
impl LlmProvider for CerebrasProvider {
    async fn complete(&self, prompt: Prompt<'_>) -> Result<Completion, LlmProviderError> {
        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_mode_requests_json_object() {
        let provider = CerebrasProvider::new("key", None, "llama-3.3-70b", 0.1, Duration::from_secs(1));
        let body = serde_json::to_value(provider.body(&Prompt::json("sys", "4k tv"))).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["model"], "llama-3.3-70b");
    }

    #[test]
    fn test_reply_without_choices_is_empty() {
        let reply: ChatReply = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            reply.into_completion("m", 3),
            Err(LlmProviderError::EmptyCompletion("cerebras"))
        ));
    }

    #[test]
    fn test_reply_usage_is_optional() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "{}"}}]}"#,
        )
        .unwrap();
        let completion = reply.into_completion("m", 3).unwrap();
        assert_eq!(completion.content, "{}");
        assert!(completion.usage.is_none());
    }
}
