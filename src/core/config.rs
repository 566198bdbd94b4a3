

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{Result, ShopsenseError};


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub overall_budget_ms: u64,
    pub classify_timeout_ms: u64,
    pub expansion_timeout_ms: u64,
    pub embedding_timeout_ms: u64,
    pub cache_timeout_ms: u64,
    pub execution_timeout_ms: u64,

    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub similarity_threshold: f64,
    pub nearest_k: usize,

    pub max_merged_terms: usize,
    pub entity_threshold: usize,
    pub embed_with_expansion: bool,
    pub rules_path: Option<String>,

    pub vector_k: usize,
    pub vector_k_wide: usize,
    pub wide_term_threshold: usize,
    pub result_limit: usize,

    pub min_results: usize,
    pub max_relaxations: usize,
    pub widen_percent: f64,
    pub review_queue_capacity: usize,

    pub llm_low_provider: String,
    pub llm_low_model: String,
    pub llm_low_url: Option<String>,
    pub llm_low_api_key: Option<String>,
    pub llm_high_provider: String,
    pub llm_high_model: String,
    pub llm_high_url: Option<String>,
    pub llm_high_api_key: Option<String>,
    pub llm_temperature: f64,

    pub local_model_enabled: bool,
    pub local_model_url: String,
    pub local_model: String,

    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_url: String,
    pub embedding_api_key: Option<String>,

    pub search_url: String,
    pub http_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            overall_budget_ms: crate::DEFAULT_BUDGET_MS,
            classify_timeout_ms: 40,
            expansion_timeout_ms: 60,
            embedding_timeout_ms: 60,
            cache_timeout_ms: 10,
            execution_timeout_ms: 150,

            cache_ttl_secs: 3600,
            cache_capacity: 10_000,
            similarity_threshold: 0.85,
            nearest_k: 5,

            max_merged_terms: 8,
            entity_threshold: 3,
            embed_with_expansion: true,
            rules_path: None,

            vector_k: 50,
            vector_k_wide: 1000,
            wide_term_threshold: 10,
            result_limit: 50,

            min_results: 50,
            max_relaxations: 2,
            widen_percent: 15.0,
            review_queue_capacity: 256,

            llm_low_provider: "ollama".to_string(),
            llm_low_model: "llama3.2".to_string(),
            llm_low_url: Some(crate::DEFAULT_OLLAMA_URL.to_string()),
            llm_low_api_key: None,
            llm_high_provider: "cerebras".to_string(),
            llm_high_model: "llama-3.3-70b".to_string(),
            llm_high_url: None,
            llm_high_api_key: None,
            llm_temperature: 0.2,

            local_model_enabled: true,
            local_model_url: crate::DEFAULT_OLLAMA_URL.to_string(),
            local_model: "llama3.2:1b".to_string(),

            embedding_provider: "ollama".to_string(),
            embedding_model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_url: crate::DEFAULT_OLLAMA_URL.to_string(),
            embedding_api_key: None,

            search_url: "http://localhost:9200".to_string(),
            http_timeout_secs: 5,
        }
    }
}

impl PipelineConfig {
    /// Layers an optional config file and `SHOPSENSE__*` variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let cfg: Self = builder
            .add_source(
                config::Environment::with_prefix("SHOPSENSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        info!(
            "Pipeline config loaded: budget={}ms, ttl={}s, max_terms={}",
            cfg.overall_budget_ms, cfg.cache_ttl_secs, cfg.max_merged_terms
        );
        Ok(cfg)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("SHOPSENSE_BUDGET_MS") {
            config.overall_budget_ms = v;
        }
        if let Some(v) = env_parse("SHOPSENSE_CACHE_TTL_SECS") {
            config.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse("SHOPSENSE_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = v;
        }
        if let Some(v) = env_parse("SHOPSENSE_MAX_TERMS") {
            config.max_merged_terms = v;
        }
        if let Some(v) = env_parse("SHOPSENSE_MIN_RESULTS") {
            config.min_results = v;
        }
        if let Ok(path) = std::env::var("SHOPSENSE_RULES_PATH") {
            config.rules_path = Some(path);
        }
        if let Ok(provider) = std::env::var("SHOPSENSE_LLM_HIGH_PROVIDER") {
            config.llm_high_provider = provider;
        }
        if let Ok(model) = std::env::var("SHOPSENSE_LLM_HIGH_MODEL") {
            config.llm_high_model = model;
        }
        if let Ok(key) = std::env::var("SHOPSENSE_LLM_HIGH_API_KEY") {
            config.llm_high_api_key = Some(key);
        }
        if let Ok(model) = std::env::var("SHOPSENSE_LLM_LOW_MODEL") {
            config.llm_low_model = model;
        }
        if let Ok(url) = std::env::var("SHOPSENSE_EMBEDDING_URL") {
            config.embedding_url = url;
        }
        if let Ok(key) = std::env::var("SHOPSENSE_EMBEDDING_API_KEY") {
            config.embedding_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("SHOPSENSE_SEARCH_URL") {
            config.search_url = url;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ShopsenseError::Config(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.widen_percent) {
            return Err(ShopsenseError::Config(format!(
                "widen_percent must be in [0, 100], got {}",
                self.widen_percent
            )));
        }
        for (name, value) in [
            ("max_merged_terms", self.max_merged_terms),
            ("cache_capacity", self.cache_capacity),
            ("vector_k", self.vector_k),
            ("result_limit", self.result_limit),
            ("nearest_k", self.nearest_k),
        ] {
            if value == 0 {
                return Err(ShopsenseError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.overall_budget_ms == 0 {
            return Err(ShopsenseError::Config("overall_budget_ms must be positive".to_string()));
        }
        for (name, value) in [
            ("search_url", Some(&self.search_url)),
            ("embedding_url", Some(&self.embedding_url)),
            ("local_model_url", Some(&self.local_model_url)),
            ("llm_low_url", self.llm_low_url.as_ref()),
            ("llm_high_url", self.llm_high_url.as_ref()),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw)
                    .map_err(|e| ShopsenseError::Config(format!("{name} is not a valid URL: {e}")))?;
            }
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
