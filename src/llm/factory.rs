

use std::sync::Arc;
use std::time::Duration;

use super::client::ProviderModelClient;
use super::embeddings::EmbeddingGenerator;
use super::providers::base::LlmProvider;
use super::providers::cerebras::CerebrasProvider;
use super::providers::ollama::OllamaProvider;
use crate::core::config::PipelineConfig;
use crate::core::error::{Result, ShopsenseError};
use crate::{DEFAULT_EMBEDDING_CACHE_SIZE, DEFAULT_OLLAMA_URL};


pub struct LlmProviderFactory;

impl LlmProviderFactory {
    pub fn create(
        provider: &str,
        model: &str,
        api_key: Option<&str>,
        base_url: Option<&str>,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Arc<dyn LlmProvider>> {
        match provider {
            "cerebras" | "openai" => {
                let api_key = api_key.ok_or_else(|| {
                    ShopsenseError::Config(format!("provider {provider} requires an API key"))
                })?;
                Ok(Arc::new(CerebrasProvider::new(
                    api_key,
                    base_url.map(String::from),
                    model,
                    temperature,
                    timeout,
                )))
            }
            "ollama" => Ok(Arc::new(OllamaProvider::new(
                base_url.unwrap_or(DEFAULT_OLLAMA_URL),
                model,
                temperature,
                timeout,
            ))),
            other => Err(ShopsenseError::Config(format!(
                "Unknown provider: {other}. Supported: cerebras, openai, ollama"
            ))),
        }
    }
}


pub struct ModelClientFactory;

impl ModelClientFactory {
    pub fn embeddings(config: &PipelineConfig) -> Arc<EmbeddingGenerator> {
        Arc::new(EmbeddingGenerator::new(
            config.embedding_provider.clone(),
            config.embedding_url.clone(),
            config.embedding_model.clone(),
            config.embedding_api_key.clone(),
            Duration::from_secs(config.http_timeout_secs),
            DEFAULT_EMBEDDING_CACHE_SIZE,
            config.cache_ttl_secs,
        ))
    }

    pub fn primary(
        config: &PipelineConfig,
        embeddings: Arc<EmbeddingGenerator>,
    ) -> Result<ProviderModelClient> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let low = LlmProviderFactory::create(
            &config.llm_low_provider,
            &config.llm_low_model,
            config.llm_low_api_key.as_deref(),
            config.llm_low_url.as_deref(),
            config.llm_temperature,
            timeout,
        )?;
        let high = LlmProviderFactory::create(
            &config.llm_high_provider,
            &config.llm_high_model,
            config.llm_high_api_key.as_deref(),
            config.llm_high_url.as_deref(),
            config.llm_temperature,
            timeout,
        )?;
        Ok(ProviderModelClient::new(
            "primary",
            low,
            high,
            embeddings,
            config.max_merged_terms,
        ))
    }

    /// The offline fallback: one local Ollama model serves both tiers.
    pub fn local(
        config: &PipelineConfig,
        embeddings: Arc<EmbeddingGenerator>,
    ) -> Option<ProviderModelClient> {
        if !config.local_model_enabled {
            return None;
        }
        let local: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(
            config.local_model_url.clone(),
            config.local_model.clone(),
            config.llm_temperature,
            Duration::from_secs(config.http_timeout_secs),
        ));
        Some(ProviderModelClient::new(
            "local",
            Arc::clone(&local),
            local,
            embeddings,
            config.max_merged_terms,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ModelClient;

    #[test]
    fn test_create_ollama_provider() {
        let provider = LlmProviderFactory::create(
            "ollama",
            "llama3.2",
            None,
            None,
            0.2,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "llama3.2");
    }

    #[test]
    fn test_cerebras_requires_key() {
        let result = LlmProviderFactory::create(
            "cerebras",
            "llama-3.3-70b",
            None,
            None,
            0.2,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ShopsenseError::Config(_))));
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let result = LlmProviderFactory::create(
            "unknown",
            "model",
            None,
            None,
            0.5,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(ShopsenseError::Config(msg)) if msg.contains("Unknown provider")));
    }

    #[test]
    fn test_local_client_respects_flag() {
        let mut config = PipelineConfig::default();
        let embeddings = ModelClientFactory::embeddings(&config);
        assert_eq!(
            ModelClientFactory::local(&config, Arc::clone(&embeddings)).map(|c| c.name().to_string()),
            Some("local".to_string())
        );
        config.local_model_enabled = false;
        assert!(ModelClientFactory::local(&config, embeddings).is_none());
    }

    #[test]
    fn test_primary_client_from_config() {
        let config = PipelineConfig {
            llm_high_api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let embeddings = ModelClientFactory::embeddings(&config);
        let client = ModelClientFactory::primary(&config, embeddings).unwrap();
        assert_eq!(client.name(), "primary");
    }
}
