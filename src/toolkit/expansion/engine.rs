use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::models::{embedding_input, ExpansionError, ExpansionResult};
use super::rules::RuleTable;
use crate::core::config::PipelineConfig;
use crate::llm::client::{ExpansionTerm, ModelClient, ModelError};
use crate::llm::routing::{ModelTier, RoutingPolicy, RoutingSignals};
use crate::safe_truncate_ellipsis;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionConfig {
    pub max_merged_terms: usize,
    pub expansion_timeout: Duration,
    pub embedding_timeout: Duration,
    /// Embed `clean_text + merged terms` after the join; otherwise embed the
    /// clean text alongside the model call.
    pub embed_with_expansion: bool,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_merged_terms: 8,
            expansion_timeout: Duration::from_millis(60),
            embedding_timeout: Duration::from_millis(60),
            embed_with_expansion: true,
        }
    }
}

impl From<&PipelineConfig> for ExpansionConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_merged_terms: config.max_merged_terms,
            expansion_timeout: Duration::from_millis(config.expansion_timeout_ms),
            embedding_timeout: Duration::from_millis(config.embedding_timeout_ms),
            embed_with_expansion: config.embed_with_expansion,
        }
    }
}


/// Signals gathered before expansion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpansionRequest<'a> {
    pub clean_text: &'a str,
    pub redaction_count: usize,
    pub entity_count: usize,
}


/// Union of rule and model terms, case-normalized. Rule terms come first and
/// are kept whole; model terms fill what is left of `cap`, highest confidence
/// first.
pub fn merge_terms(rule_terms: &[String], model_terms: &[ExpansionTerm], cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(cap.max(rule_terms.len()));

    for term in rule_terms {
        let term = term.trim();
        if !term.is_empty() && seen.insert(term.to_lowercase()) {
            merged.push(term.to_string());
        }
    }

    let mut ranked: Vec<&ExpansionTerm> = model_terms.iter().collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    for candidate in ranked {
        if merged.len() >= cap {
            break;
        }
        let term = candidate.term.trim();
        if !term.is_empty() && seen.insert(term.to_lowercase()) {
            merged.push(term.to_string());
        }
    }
    merged
}


pub struct ExpansionEngine {
    rules: Option<Arc<RuleTable>>,
    routing: RoutingPolicy,
    config: ExpansionConfig,
}

impl ExpansionEngine {
    pub fn new(rules: Option<Arc<RuleTable>>, routing: RoutingPolicy, config: ExpansionConfig) -> Self {
        info!(
            "ExpansionEngine initialized: rules={}, cap={}, model_timeout={}ms",
            rules.as_ref().map(|r| r.len()).unwrap_or(0),
            config.max_merged_terms,
            config.expansion_timeout.as_millis()
        );
        Self {
            rules,
            routing,
            config,
        }
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    pub fn route(&self, request: &ExpansionRequest<'_>, rule_term_count: usize) -> ModelTier {
        let signals = RoutingSignals {
            redaction_count: request.redaction_count,
            entity_count: request.entity_count,
            merged_term_count: rule_term_count,
        };
        let tier = self.routing.route(signals);
        debug!("Routed {:?} to {:?}", signals, tier);
        tier
    }

    /// Rule lookup and model expansion joined before merging. A failed or
    /// timed-out model call degrades to rule terms; only when the rule table
    /// is also unavailable does this return an error.
    pub async fn expand(
        &self,
        model: &dyn ModelClient,
        request: &ExpansionRequest<'_>,
    ) -> Result<ExpansionResult, ExpansionError> {
        let clean_text = request.clean_text;
        let cap = self.config.max_merged_terms;

        let rule_terms = self
            .rules
            .as_ref()
            .map(|table| table.lookup(clean_text, cap))
            .unwrap_or_default();
        let tier = self.route(request, rule_terms.len());

        debug!(
            "Expanding {:?}: rule_terms={}",
            safe_truncate_ellipsis(clean_text, 60),
            rule_terms.len()
        );

        let model_call = async {
            let budget_ms = self.config.expansion_timeout.as_millis() as u64;
            match timeout(self.config.expansion_timeout, model.expand(clean_text, tier)).await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout {
                    operation: "expand",
                    budget_ms,
                }),
            }
        };

        let (model_outcome, early_vector) = if self.config.embed_with_expansion {
            (model_call.await, None)
        } else {
            let (outcome, vector) = tokio::join!(model_call, self.embed(model, clean_text, tier));
            (outcome, Some(vector))
        };

        let (model_terms, degraded) = match model_outcome {
            Ok(terms) => (terms, false),
            Err(err) => {
                if self.rules.is_none() {
                    warn!("Expansion unavailable: no rule table and model failed: {}", err);
                    return Err(ExpansionError::Unavailable {
                        rule_error: "rule table not configured".to_string(),
                        model_error: err.to_string(),
                    });
                }
                warn!("Model expansion failed, using rule terms only: {}", err);
                (Vec::new(), true)
            }
        };

        let merged_terms = merge_terms(&rule_terms, &model_terms, cap);
        let vector = match early_vector {
            Some(vector) => vector,
            None => {
                self.embed(model, &embedding_input(clean_text, &merged_terms), tier)
                    .await
            }
        };

        Ok(ExpansionResult {
            original_text: clean_text.to_string(),
            rule_terms,
            model_terms: model_terms
                .into_iter()
                .map(|t| t.term.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            merged_terms,
            vector,
            degraded,
            tier,
            entity_count: request.entity_count,
        })
    }

    /// Embedding failures leave the vector out; they never fail expansion.
    pub async fn embed(&self, model: &dyn ModelClient, text: &str, tier: ModelTier) -> Option<Vec<f32>> {
        match timeout(self.config.embedding_timeout, model.embed(text, tier)).await {
            Ok(Ok(vector)) if !vector.is_empty() => Some(vector),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                warn!("Embedding failed: {}", e);
                None
            }
            Err(_) => {
                warn!(
                    "Embedding timed out after {}ms",
                    self.config.embedding_timeout.as_millis()
                );
                None
            }
        }
    }
}
