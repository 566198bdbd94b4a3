//! Scriptable collaborators for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::{ExecutionError, ExecutionResult, SearchExecutor};
use crate::llm::client::{Classification, ExpansionTerm, ModelClient, ModelError};
use crate::llm::routing::ModelTier;
use crate::toolkit::query_builder::StructuredQuery;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    Succeed,
    Fail,
    /// Sleeps far past any stage timeout.
    Hang,
}


pub struct StubModelClient {
    name: String,
    terms: Vec<ExpansionTerm>,
    entities: Vec<String>,
    vector: Option<Vec<f32>>,
    expand_delay: Duration,
    expand_behavior: StubBehavior,
    classify_behavior: StubBehavior,
    expand_calls: AtomicUsize,
    classify_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    tiers: Mutex<Vec<ModelTier>>,
}

impl StubModelClient {
    pub fn new() -> Self {
        Self {
            name: "stub".to_string(),
            terms: Vec::new(),
            entities: Vec::new(),
            vector: Some(vec![1.0, 0.0, 0.0]),
            expand_delay: Duration::ZERO,
            expand_behavior: StubBehavior::Succeed,
            classify_behavior: StubBehavior::Succeed,
            expand_calls: AtomicUsize::new(0),
            classify_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            tiers: Mutex::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_terms(mut self, terms: &[(&str, f32)]) -> Self {
        self.terms = terms.iter().map(|(t, c)| ExpansionTerm::new(*t, *c)).collect();
        self
    }

    pub fn with_entities(mut self, entities: &[&str]) -> Self {
        self.entities = entities.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_vector(mut self, vector: Option<Vec<f32>>) -> Self {
        self.vector = vector;
        self
    }

    pub fn with_expand_delay(mut self, delay: Duration) -> Self {
        self.expand_delay = delay;
        self
    }

    pub fn expand_behavior(mut self, behavior: StubBehavior) -> Self {
        self.expand_behavior = behavior;
        self
    }

    pub fn classify_behavior(mut self, behavior: StubBehavior) -> Self {
        self.classify_behavior = behavior;
        self
    }

    pub fn expand_calls(&self) -> usize {
        self.expand_calls.load(Ordering::SeqCst)
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Tiers passed to `expand`, in call order.
    pub fn expand_tiers(&self) -> Vec<ModelTier> {
        self.tiers.lock().clone()
    }
}

async fn act(behavior: StubBehavior, operation: &str) -> Result<(), ModelError> {
    match behavior {
        StubBehavior::Succeed => Ok(()),
        StubBehavior::Fail => Err(ModelError::Provider(format!("{operation} failed"))),
        StubBehavior::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }
}

#[async_trait]
impl ModelClient for StubModelClient {
    async fn classify(&self, _text: &str, _tier: ModelTier) -> Result<Classification, ModelError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        act(self.classify_behavior, "classify").await?;
        Ok(Classification {
            intent: "product_search".to_string(),
            entities: self.entities.clone(),
        })
    }

    async fn expand(&self, _text: &str, tier: ModelTier) -> Result<Vec<ExpansionTerm>, ModelError> {
        self.expand_calls.fetch_add(1, Ordering::SeqCst);
        self.tiers.lock().push(tier);
        if !self.expand_delay.is_zero() {
            tokio::time::sleep(self.expand_delay).await;
        }
        act(self.expand_behavior, "expand").await?;
        Ok(self.terms.clone())
    }

    async fn embed(&self, _text: &str, _tier: ModelTier) -> Result<Vec<f32>, ModelError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.vector
            .clone()
            .ok_or_else(|| ModelError::NotConfigured("no embedding".to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}


/// Replays a script of result counts (or errors), one per `execute` call.
/// The last scripted step repeats once the script runs out.
pub struct StubExecutor {
    script: Mutex<VecDeque<Result<usize, ExecutionError>>>,
    last: Mutex<Result<usize, ExecutionError>>,
    executed: Mutex<Vec<StructuredQuery>>,
}

impl StubExecutor {
    pub fn counts(counts: &[usize]) -> Self {
        Self::script(counts.iter().map(|c| Ok(*c)).collect())
    }

    pub fn unavailable() -> Self {
        Self::script(vec![Err(ExecutionError::Unavailable("stub down".to_string()))])
    }

    pub fn script(steps: Vec<Result<usize, ExecutionError>>) -> Self {
        Self {
            last: Mutex::new(steps.last().cloned().unwrap_or(Ok(0))),
            script: Mutex::new(steps.into()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<StructuredQuery> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl SearchExecutor for StubExecutor {
    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionResult, ExecutionError> {
        self.executed.lock().push(query.clone());
        let step = self.script.lock().pop_front().unwrap_or_else(|| self.last.lock().clone());
        let count = step?;
        Ok(ExecutionResult {
            result_count: count,
            result_set: (0..count.min(3))
                .map(|i| serde_json::json!({ "id": i }))
                .collect(),
            latency_ms: 1,
        })
    }
}
