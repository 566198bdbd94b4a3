use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::routing::ModelTier;


#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpansionError {
    #[error("Expansion unavailable: rule table={rule_error}, model={model_error}")]
    Unavailable {
        rule_error: String,
        model_error: String,
    },
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionResult {
    pub original_text: String,
    pub rule_terms: Vec<String>,
    pub model_terms: Vec<String>,
    pub merged_terms: Vec<String>,
    pub vector: Option<Vec<f32>>,

    /// Set when the model call failed or timed out and only rule terms were used.
    pub degraded: bool,
    pub tier: ModelTier,
    pub entity_count: usize,
}

impl ExpansionResult {
    /// Rule-only result for callers that never reached the model.
    pub fn rule_only(original_text: impl Into<String>, rule_terms: Vec<String>) -> Self {
        Self {
            original_text: original_text.into(),
            merged_terms: rule_terms.clone(),
            rule_terms,
            model_terms: Vec::new(),
            vector: None,
            degraded: true,
            tier: ModelTier::LowCost,
            entity_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.merged_terms.is_empty()
    }

    /// Text sent to the embedding endpoint: the clean query plus merged terms.
    pub fn embedding_input(&self) -> String {
        embedding_input(&self.original_text, &self.merged_terms)
    }
}


pub fn embedding_input(clean_text: &str, merged_terms: &[String]) -> String {
    if merged_terms.is_empty() {
        return clean_text.to_string();
    }
    format!("{} {}", clean_text, merged_terms.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_only_is_degraded() {
        let result = ExpansionResult::rule_only("4k tv", vec!["UHD".to_string()]);
        assert!(result.degraded);
        assert_eq!(result.merged_terms, result.rule_terms);
        assert!(result.model_terms.is_empty());
    }

    #[test]
    fn test_embedding_input_joins_terms() {
        let result = ExpansionResult::rule_only("4k tv", vec!["UHD".to_string(), "HDR10".to_string()]);
        assert_eq!(result.embedding_input(), "4k tv UHD HDR10");
        assert_eq!(embedding_input("socks", &[]), "socks");
    }
}
