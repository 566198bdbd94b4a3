use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::embeddings::{EmbeddingError, EmbeddingGenerator};
use super::prompt::{
    build_classify_prompt, build_expand_prompt, extract_json_object, CLASSIFY_SYSTEM_PROMPT,
    EXPAND_SYSTEM_PROMPT,
};
use super::providers::base::{LlmProvider, LlmProviderError, Prompt};
use super::routing::ModelTier;


#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{operation} timed out after {budget_ms}ms")]
    Timeout {
        operation: &'static str,
        budget_ms: u64,
    },

    #[error("Model provider error: {0}")]
    Provider(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model not configured: {0}")]
    NotConfigured(String),
}

impl From<LlmProviderError> for ModelError {
    fn from(err: LlmProviderError) -> Self {
        match err {
            LlmProviderError::Json(e) => Self::InvalidResponse(e.to_string()),
            other => Self::Provider(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for ModelError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::InvalidResponse(msg) => Self::InvalidResponse(msg),
            EmbeddingError::NotImplemented(p) => Self::NotConfigured(p),
            other => Self::Provider(other.to_string()),
        }
    }
}


#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(default = "default_intent")]
    pub intent: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

fn default_intent() -> String {
    "product_search".to_string()
}

impl Classification {
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionTerm {
    pub term: String,
    pub confidence: f32,
}

impl ExpansionTerm {
    pub fn new(term: impl Into<String>, confidence: f32) -> Self {
        Self {
            term: term.into(),
            confidence,
        }
    }
}


/// The model-service collaborator. Timeouts are applied by callers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn classify(&self, text: &str, tier: ModelTier) -> Result<Classification, ModelError>;

    async fn expand(&self, text: &str, tier: ModelTier) -> Result<Vec<ExpansionTerm>, ModelError>;

    async fn embed(&self, text: &str, tier: ModelTier) -> Result<Vec<f32>, ModelError>;

    fn name(&self) -> &str;
}


#[derive(Deserialize)]
struct ExpandResponse {
    #[serde(default)]
    terms: Vec<RawTerm>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTerm {
    Scored { term: String, confidence: Option<f32> },
    Plain(String),
}


/// `ModelClient` backed by two chat providers (one per tier) and an embedding
/// endpoint shared by both tiers.
pub struct ProviderModelClient {
    name: String,
    low: Arc<dyn LlmProvider>,
    high: Arc<dyn LlmProvider>,
    embeddings: Arc<EmbeddingGenerator>,
    max_terms: usize,
}

impl ProviderModelClient {
    pub fn new(
        name: impl Into<String>,
        low: Arc<dyn LlmProvider>,
        high: Arc<dyn LlmProvider>,
        embeddings: Arc<EmbeddingGenerator>,
        max_terms: usize,
    ) -> Self {
        Self {
            name: name.into(),
            low,
            high,
            embeddings,
            max_terms,
        }
    }

    fn provider(&self, tier: ModelTier) -> &Arc<dyn LlmProvider> {
        match tier {
            ModelTier::LowCost => &self.low,
            ModelTier::HighCapability => &self.high,
        }
    }
}

#[async_trait]
impl ModelClient for ProviderModelClient {
    async fn classify(&self, text: &str, tier: ModelTier) -> Result<Classification, ModelError> {
        let prompt = build_classify_prompt(text);
        let completion = self
            .provider(tier)
            .complete(Prompt::json(CLASSIFY_SYSTEM_PROMPT, &prompt))
            .await?;
        debug!(
            "Classification from {}/{} on {:?} in {}ms",
            completion.provider, completion.model, tier, completion.latency_ms
        );
        parse_classification(&completion.content)
    }

    async fn expand(&self, text: &str, tier: ModelTier) -> Result<Vec<ExpansionTerm>, ModelError> {
        let prompt = build_expand_prompt(text, self.max_terms);
        let completion = self
            .provider(tier)
            .complete(Prompt::json(EXPAND_SYSTEM_PROMPT, &prompt))
            .await?;
        debug!(
            "Expansion from {}/{} on {:?} in {}ms (tokens={:?})",
            completion.provider,
            completion.model,
            tier,
            completion.latency_ms,
            completion.usage.map(|u| u.total())
        );
        parse_expansion(&completion.content)
    }

    async fn embed(&self, text: &str, _tier: ModelTier) -> Result<Vec<f32>, ModelError> {
        Ok(self.embeddings.generate(text).await?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}


pub fn parse_classification(response: &str) -> Result<Classification, ModelError> {
    let json = extract_json_object(response)
        .ok_or_else(|| ModelError::InvalidResponse("no JSON object in classification".to_string()))?;
    serde_json::from_str(json).map_err(|e| ModelError::InvalidResponse(e.to_string()))
}


pub fn parse_expansion(response: &str) -> Result<Vec<ExpansionTerm>, ModelError> {
    let json = extract_json_object(response)
        .ok_or_else(|| ModelError::InvalidResponse("no JSON object in expansion".to_string()))?;
    let parsed: ExpandResponse =
        serde_json::from_str(json).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

    let total = parsed.terms.len();
    let terms: Vec<ExpansionTerm> = parsed
        .terms
        .into_iter()
        .enumerate()
        .filter_map(|(rank, raw)| {
            // Unscored terms get a confidence that decays with position.
            let (term, confidence) = match raw {
                RawTerm::Scored { term, confidence } => {
                    (term, confidence.unwrap_or_else(|| rank_confidence(rank, total)))
                }
                RawTerm::Plain(term) => (term, rank_confidence(rank, total)),
            };
            let term = term.trim().to_string();
            (!term.is_empty()).then(|| ExpansionTerm::new(term, confidence.clamp(0.0, 1.0)))
        })
        .collect();

    if terms.is_empty() && total > 0 {
        warn!("Model expansion returned only blank terms");
    }
    Ok(terms)
}

fn rank_confidence(rank: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    1.0 - (rank as f32 / total as f32) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::base::{Completion, ResponseMode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CannedProvider {
        name: &'static str,
        reply: &'static str,
        calls: AtomicUsize,
    }

    impl CannedProvider {
        fn new(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn complete(&self, prompt: Prompt<'_>) -> Result<Completion, LlmProviderError> {
            assert_eq!(prompt.mode, ResponseMode::JsonObject);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                content: self.reply.to_string(),
                provider: self.name.to_string(),
                model: "canned".to_string(),
                usage: None,
                latency_ms: 1,
            })
        }

        fn provider_name(&self) -> &str {
            self.name
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[tokio::test]
    async fn test_tier_selects_provider() {
        let low = CannedProvider::new("low", r#"{"terms": ["cheap"]}"#);
        let high = CannedProvider::new("high", r#"{"terms": ["careful"]}"#);
        let embeddings = Arc::new(EmbeddingGenerator::new(
            "ollama",
            "http://127.0.0.1:9",
            "nomic-embed-text",
            None,
            Duration::from_millis(100),
            4,
            60,
        ));
        let client = ProviderModelClient::new(
            "test",
            Arc::clone(&low) as Arc<dyn LlmProvider>,
            Arc::clone(&high) as Arc<dyn LlmProvider>,
            embeddings,
            8,
        );

        let terms = client.expand("tv", ModelTier::HighCapability).await.unwrap();
        assert_eq!(terms[0].term, "careful");
        let terms = client.expand("tv", ModelTier::LowCost).await.unwrap();
        assert_eq!(terms[0].term, "cheap");
        assert_eq!(low.calls.load(Ordering::SeqCst), 1);
        assert_eq!(high.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_classification() {
        let c = parse_classification(r#"{"intent": "comparison", "entities": ["tv", "soundbar"]}"#).unwrap();
        assert_eq!(c.intent, "comparison");
        assert_eq!(c.entity_count(), 2);

        let defaulted = parse_classification("{}").unwrap();
        assert_eq!(defaulted.intent, "product_search");
        assert_eq!(defaulted.entity_count(), 0);
    }

    #[test]
    fn test_parse_classification_rejects_garbage() {
        assert!(matches!(
            parse_classification("sorry, I can't"),
            Err(ModelError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_expansion_scored_and_plain() {
        let terms = parse_expansion(
            r#"```json
{"terms": [{"term": "UHD", "confidence": 0.9}, "HDR", {"term": "  "}, {"term": "OLED"}]}
```"#,
        )
        .unwrap();
        let names: Vec<_> = terms.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(names, vec!["UHD", "HDR", "OLED"]);
        assert!((terms[0].confidence - 0.9).abs() < f32::EPSILON);
        assert!(terms[1].confidence > terms[2].confidence);
    }

    #[test]
    fn test_parse_expansion_clamps_confidence() {
        let terms = parse_expansion(r#"{"terms": [{"term": "a", "confidence": 7.0}]}"#).unwrap();
        assert_eq!(terms[0].confidence, 1.0);
    }

    #[test]
    fn test_provider_errors_convert() {
        let err: ModelError = LlmProviderError::Status {
            provider: "ollama",
            status: 503,
            body: "loading".to_string(),
        }
        .into();
        assert!(matches!(err, ModelError::Provider(msg) if msg.contains("503")));
        let err: ModelError = LlmProviderError::EmptyCompletion("cerebras").into();
        assert!(matches!(err, ModelError::Provider(_)));
        let err: ModelError = EmbeddingError::NotImplemented("x".to_string()).into();
        assert_eq!(err, ModelError::NotConfigured("x".to_string()));
    }
}
