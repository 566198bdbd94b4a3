use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{PipelineTrace, ReviewRecord, SearchOutcome};
use crate::core::config::PipelineConfig;
use crate::core::error::{PipelineError, PipelineErrorKind, Result};
use crate::core::events::{Event, EventBus, EventType};
use crate::core::fingerprint::{normalize_query, Fingerprint};
use crate::db::{HttpSearchExecutor, SearchExecutor};
use crate::llm::client::ModelClient;
use crate::llm::factory::ModelClientFactory;
use crate::llm::routing::{ModelTier, RoutingPolicy};
use crate::safe_truncate_ellipsis;
use crate::toolkit::cache::{
    CacheEntry, CacheStats, CacheStore, FlightOutcome, InMemoryCacheStore, SingleFlight,
};
use crate::toolkit::expansion::{
    extract_price, merge_filters, ExpansionConfig, ExpansionEngine, ExpansionError,
    ExpansionRequest, ExpansionResult, RuleTable,
};
use crate::toolkit::query_builder::{
    BuildParams, ExplicitFilter, QueryBuilder, QueryBuilderConfig, StructuredQuery,
};
use crate::toolkit::relaxation::{
    FallbackReason, FallbackSignal, FallbackStage, FallbackState, RelaxationConfig,
    RelaxationController,
};
use crate::toolkit::sanitizer::Sanitizer;
use crate::utils::elapsed_ms;

type FlightResult = std::result::Result<ExpansionResult, ExpansionError>;


/// A built query plus what the search path needs to continue from it.
struct Prepared {
    query: StructuredQuery,
    floor: Option<StructuredQuery>,
    trace: PipelineTrace,
    deadline: Instant,
}


/// Drives one request from raw text to a `StructuredQuery` (and optionally
/// through execution and relaxation) under an overall latency budget.
pub struct Orchestrator {
    config: PipelineConfig,
    sanitizer: Sanitizer,
    cache: Arc<dyn CacheStore>,
    flights: SingleFlight<FlightResult>,
    model: Arc<dyn ModelClient>,
    local_model: Option<Arc<dyn ModelClient>>,
    engine: Arc<ExpansionEngine>,
    builder: QueryBuilder,
    relaxation: Option<RelaxationController>,
    events: Arc<EventBus>,
    review_queue: Mutex<VecDeque<ReviewRecord>>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        cache: Arc<dyn CacheStore>,
        model: Arc<dyn ModelClient>,
        rules: Option<Arc<RuleTable>>,
    ) -> Self {
        let engine = ExpansionEngine::new(
            rules,
            RoutingPolicy::new(config.entity_threshold),
            ExpansionConfig::from(&config),
        );
        info!(
            "Orchestrator initialized: model={}, budget={}ms",
            model.name(),
            config.overall_budget_ms
        );
        Self {
            sanitizer: Sanitizer::new(),
            cache,
            flights: SingleFlight::new(),
            model,
            local_model: None,
            engine: Arc::new(engine),
            builder: QueryBuilder::new(QueryBuilderConfig::from(&config)),
            relaxation: None,
            events: Arc::new(EventBus::new()),
            review_queue: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Wires the production collaborators from configuration.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let rules = match &config.rules_path {
            Some(path) => RuleTable::load(Path::new(path))?,
            None => RuleTable::builtin(),
        };
        let embeddings = ModelClientFactory::embeddings(&config);
        let primary = ModelClientFactory::primary(&config, Arc::clone(&embeddings))?;
        let local = ModelClientFactory::local(&config, embeddings);
        let cache = Arc::new(InMemoryCacheStore::new(config.cache_capacity));
        let executor = Arc::new(HttpSearchExecutor::new(
            &config.search_url,
            Duration::from_secs(config.http_timeout_secs),
        ));

        let mut orchestrator = Self::new(config, cache, Arc::new(primary), Some(Arc::new(rules)))
            .with_executor(executor);
        if let Some(local) = local {
            orchestrator = orchestrator.with_local_model(Arc::new(local));
        }
        Ok(orchestrator)
    }

    #[must_use]
    pub fn with_local_model(mut self, local_model: Arc<dyn ModelClient>) -> Self {
        self.local_model = Some(local_model);
        self
    }

    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn SearchExecutor>) -> Self {
        self.relaxation = Some(RelaxationController::new(
            executor,
            RelaxationConfig::from(&self.config),
        ));
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    pub fn review_queue(&self) -> Vec<ReviewRecord> {
        self.review_queue.lock().iter().cloned().collect()
    }

    /// Raw text to structured query. Model and build failures are absorbed;
    /// the only error is having nothing at all to search for.
    pub async fn understand_and_build(
        &self,
        raw_query: &str,
        explicit_filters: &[ExplicitFilter],
        budget_ms: u64,
    ) -> std::result::Result<StructuredQuery, PipelineError> {
        self.prepare(raw_query, explicit_filters, budget_ms)
            .await
            .map(|prepared| prepared.query)
    }

    /// Builds, executes and relaxes until enough results come back or the
    /// fallback chain bottoms out.
    pub async fn search(
        &self,
        raw_query: &str,
        explicit_filters: &[ExplicitFilter],
        budget_ms: u64,
    ) -> std::result::Result<SearchOutcome, PipelineError> {
        let prepared = self.prepare(raw_query, explicit_filters, budget_ms).await?;
        let Some(controller) = &self.relaxation else {
            return Err(PipelineError::execution_unavailable(
                prepared.trace.sanitized_text,
                "no search executor configured",
            ));
        };

        let Prepared {
            query,
            floor,
            mut trace,
            deadline,
        } = prepared;
        let start = Instant::now();
        let prior_stages = trace.fallback.history.len();

        let driven = if trace.fallback.is_terminal() {
            controller
                .floor(trace.fallback.clone(), Some(query), None, Vec::new(), None)
                .await
        } else {
            controller
                .drive(trace.fallback.clone(), query, floor, Some(deadline))
                .await
        };
        self.emit(
            Event::stage_latency("execute", elapsed_ms(start)),
            &trace,
        );

        let outcome = match driven {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Search execution unavailable: {}", e);
                if !trace.fallback.is_terminal() {
                    trace.fallback.advance(FallbackSignal::ExecutionFailed, usize::MAX);
                    self.record_failure(&trace);
                }
                return Err(PipelineError::execution_unavailable(trace.sanitized_text, e.to_string()));
            }
        };

        for stage in outcome.state.history.iter().skip(prior_stages) {
            if matches!(stage, FallbackStage::Relaxed | FallbackStage::Broadened) {
                self.emit_fallback(*stage, &trace);
            }
        }
        let newly_failed = !trace.fallback.is_terminal() && outcome.state.stage == FallbackStage::Failed;
        trace.fallback = outcome.state;
        trace.attempts = outcome.attempts;
        trace.elapsed_ms += elapsed_ms(start);
        if newly_failed {
            self.record_failure(&trace);
        }

        info!(
            "Search {:?}: {} results via {}",
            safe_truncate_ellipsis(&trace.query_text, 60),
            outcome.execution.result_count,
            trace.fallback.stage
        );
        Ok(SearchOutcome {
            query: outcome.query,
            execution: outcome.execution,
            trace,
        })
    }

    async fn prepare(
        &self,
        raw_query: &str,
        explicit_filters: &[ExplicitFilter],
        budget_ms: u64,
    ) -> std::result::Result<Prepared, PipelineError> {
        let start = Instant::now();
        let budget = Duration::from_millis(budget_ms);
        let deadline = start + budget;

        let sanitized = self.sanitizer.sanitize(raw_query);
        let extraction = extract_price(&sanitized.text);
        let filters = merge_filters(explicit_filters, extraction.filters);
        let query_text = extraction.remainder;
        let fingerprint = Fingerprint::of_query(&query_text);

        let mut trace = PipelineTrace::new(
            Uuid::new_v4(),
            fingerprint,
            sanitized.text.clone(),
            query_text,
            sanitized.redaction_count,
        );
        if sanitized.redaction_count > 0 {
            self.emit(
                Event::new(
                    EventType::SanitizerRedacted,
                    json!({ "pii": sanitized.pii_count, "injection": sanitized.injection_count }),
                ),
                &trace,
            );
        }
        debug!(
            "Prepared {:?} [{}] with {} filters",
            safe_truncate_ellipsis(&trace.query_text, 60),
            trace.fingerprint,
            filters.len()
        );

        let nominal = timeout(budget, self.understand(&mut trace, &filters, deadline)).await;
        let query = match nominal {
            Ok(Some(query)) => Some(query),
            Ok(None) => None,
            Err(_) => {
                warn!(
                    "Budget of {}ms exceeded for {}",
                    budget_ms, trace.fingerprint
                );
                trace.fallback = FallbackState::new();
                trace.fallback.advance(FallbackSignal::BudgetExceeded, 0);
                None
            }
        };

        let floor = self.builder.plain_lexical(&trace.query_text, &filters, &self.params(deadline));
        let query = match query {
            Some(query) => query,
            None => {
                if !trace.fallback.is_terminal() {
                    trace.fallback.advance(FallbackSignal::BuildFailed, 0);
                }
                self.record_failure(&trace);
                match floor.clone() {
                    Some(query) => query,
                    None => {
                        let kind = if trace.fallback.reason == FallbackReason::BudgetExceeded {
                            PipelineErrorKind::PipelineTimeout
                        } else {
                            PipelineErrorKind::FallbackExhausted
                        };
                        return Err(PipelineError::new(kind, trace.sanitized_text, "nothing to query"));
                    }
                }
            }
        };

        trace.elapsed_ms = elapsed_ms(start);
        Ok(Prepared {
            query,
            floor,
            trace,
            deadline,
        })
    }

    /// The nominal sequence: cache, classify+expand (single-flight), build,
    /// store; then NearestCached and LocalModel when expansion fails.
    /// `None` means the Failed floor should be used.
    async fn understand(
        &self,
        trace: &mut PipelineTrace,
        filters: &[ExplicitFilter],
        deadline: Instant,
    ) -> Option<StructuredQuery> {
        if trace.query_text.is_empty() {
            return self.builder.plain_lexical("", filters, &self.params(deadline));
        }

        let cache_timeout = Duration::from_millis(self.config.cache_timeout_ms);
        let stage = Instant::now();
        let cached = match timeout(cache_timeout, self.cache.lookup_exact(&trace.fingerprint)).await {
            Ok(entry) => entry,
            Err(_) => {
                warn!("Cache lookup timed out; treating as miss");
                None
            }
        };
        self.emit(Event::stage_latency("cache_lookup", elapsed_ms(stage)), trace);

        if let Some(entry) = cached {
            trace.cache_hit = true;
            trace.degraded = entry.expansion.degraded;
            trace.tier = Some(entry.expansion.tier);
            self.emit(Event::new(EventType::CacheHit, json!({})), trace);
            return self.build(&entry.expansion, filters, deadline);
        }
        self.emit(Event::new(EventType::CacheMiss, json!({})), trace);

        let stage = Instant::now();
        let flight = self.flight(trace, filters, deadline).await;
        self.emit(Event::stage_latency("expand", elapsed_ms(stage)), trace);
        trace.coalesced = !flight.leader;

        match flight.value {
            Ok(expansion) if !(expansion.degraded && expansion.is_empty()) => {
                trace.degraded = expansion.degraded;
                trace.tier = Some(expansion.tier);
                if expansion.degraded {
                    self.emit(
                        Event::new(
                            EventType::ExpansionDegraded,
                            json!({ "rule_terms": expansion.rule_terms.len() }),
                        ),
                        trace,
                    );
                }

                self.build(&expansion, filters, deadline)
            }
            Ok(_) | Err(_) => {
                trace.degraded = true;
                self.emit(
                    Event::new(EventType::ExpansionDegraded, json!({ "rule_terms": 0 })),
                    trace,
                );
                trace.fallback.advance(FallbackSignal::ExpansionFailed, self.config.max_relaxations);
                self.emit_fallback(FallbackStage::NearestCached, trace);
                if let Some(query) = self.nearest_cached(trace).await {
                    return Some(query);
                }

                trace.fallback.advance(FallbackSignal::NoCachedMatch, self.config.max_relaxations);
                self.emit_fallback(FallbackStage::LocalModel, trace);
                if let Some(query) = self.local_expansion(trace, filters, deadline).await {
                    return Some(query);
                }

                trace
                    .fallback
                    .advance(FallbackSignal::LocalModelFailed, self.config.max_relaxations);
                None
            }
        }
    }

    /// Classify, expand and, for a usable expansion, build and cache the
    /// query. Runs once per fingerprint however many requests are waiting, and
    /// keeps running while any of them still is.
    async fn flight(
        &self,
        trace: &PipelineTrace,
        filters: &[ExplicitFilter],
        deadline: Instant,
    ) -> FlightOutcome<FlightResult> {
        let model = Arc::clone(&self.model);
        let engine = Arc::clone(&self.engine);
        let cache = Arc::clone(&self.cache);
        let builder = self.builder.clone();
        let filters = filters.to_vec();
        let params = self.params(deadline);
        let fingerprint = trace.fingerprint.clone();
        let text = trace.query_text.clone();
        let redaction_count = trace.redaction_count;
        let classify_timeout = Duration::from_millis(self.config.classify_timeout_ms);
        let cache_timeout = Duration::from_millis(self.config.cache_timeout_ms);
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);

        self.flights
            .run(trace.fingerprint.as_str(), move || async move {
                let entity_count = classify(model.as_ref(), &text, classify_timeout).await;
                let request = ExpansionRequest {
                    clean_text: &text,
                    redaction_count,
                    entity_count,
                };
                let expansion = match engine.expand(model.as_ref(), &request).await {
                    Ok(expansion) => expansion,
                    Err(e) => return Err(e),
                };
                if expansion.degraded {
                    return Ok(expansion);
                }

                match builder.build(&expansion, &filters, &params) {
                    Ok(query) => {
                        let entry = CacheEntry::new(
                            fingerprint.clone(),
                            normalize_query(&text),
                            query,
                            expansion.clone(),
                            ttl,
                        );
                        if timeout(cache_timeout, cache.store(entry)).await.is_err() {
                            warn!("Cache store timed out for {}", fingerprint);
                        }
                    }
                    Err(e) => debug!("Not caching {}: {}", fingerprint, e),
                }
                Ok(expansion)
            })
            .await
    }

    fn build(
        &self,
        expansion: &ExpansionResult,
        filters: &[ExplicitFilter],
        deadline: Instant,
    ) -> Option<StructuredQuery> {
        match self.builder.build(expansion, filters, &self.params(deadline)) {
            Ok(query) => Some(query),
            Err(e) => {
                warn!("Build failed: {}", e);
                None
            }
        }
    }

    fn params(&self, deadline: Instant) -> BuildParams {
        BuildParams {
            result_limit: None,
            trace_budget_ms: deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
        }
    }

    async fn nearest_cached(&self, trace: &PipelineTrace) -> Option<StructuredQuery> {
        let embedding = self
            .engine
            .embed(self.model.as_ref(), &trace.query_text, ModelTier::LowCost)
            .await?;
        let cache_timeout = Duration::from_millis(self.config.cache_timeout_ms);
        let nearest = timeout(cache_timeout, self.cache.nearest(&embedding, self.config.nearest_k))
            .await
            .ok()?;

        let best = nearest
            .into_iter()
            .find(|scored| scored.similarity >= self.config.similarity_threshold)?;
        info!(
            "Reusing cached query {} (similarity {:.3})",
            best.entry.fingerprint, best.similarity
        );
        Some(best.entry.structured_query)
    }

    async fn local_expansion(
        &self,
        trace: &mut PipelineTrace,
        filters: &[ExplicitFilter],
        deadline: Instant,
    ) -> Option<StructuredQuery> {
        let local = self.local_model.as_ref()?;
        let request = ExpansionRequest {
            clean_text: &trace.query_text,
            redaction_count: trace.redaction_count,
            entity_count: 0,
        };
        let expansion = match self.engine.expand(local.as_ref(), &request).await {
            Ok(expansion) if !expansion.is_empty() => expansion,
            Ok(_) => return None,
            Err(e) => {
                warn!("Local model expansion failed: {}", e);
                return None;
            }
        };
        trace.tier = Some(expansion.tier);
        self.build(&expansion, filters, deadline)
    }

    fn record_failure(&self, trace: &PipelineTrace) {
        let record = ReviewRecord {
            query_text: trace.sanitized_text.clone(),
            fingerprint: trace.fingerprint.clone(),
            reason: trace.fallback.reason,
            correlation_id: trace.correlation_id,
            recorded_at: Utc::now(),
        };
        {
            let mut queue = self.review_queue.lock();
            if queue.len() >= self.config.review_queue_capacity.max(1) {
                queue.pop_front();
            }
            queue.push_back(record);
        }
        let reason: &'static str = trace.fallback.reason.into();
        warn!("Query {} fell through to the lexical floor ({})", trace.fingerprint, reason);
        self.emit(
            Event::new(EventType::QueryFailed, json!({ "reason": reason })),
            trace,
        );
    }

    fn emit_fallback(&self, stage: FallbackStage, trace: &PipelineTrace) {
        let strategy: &'static str = stage.strategy().into();
        self.emit(
            Event::new(EventType::FallbackChosen, json!({ "strategy": strategy })),
            trace,
        );
    }

    fn emit(&self, event: Event, trace: &PipelineTrace) {
        self.events.emit(
            event
                .with_correlation(trace.correlation_id)
                .with_fingerprint(trace.fingerprint.to_string()),
        );
    }
}


async fn classify(model: &dyn ModelClient, text: &str, budget: Duration) -> usize {
    match timeout(budget, model.classify(text, ModelTier::LowCost)).await {
        Ok(Ok(classification)) => classification.entity_count(),
        Ok(Err(e)) => {
            warn!("Classification failed: {}", e);
            0
        }
        Err(_) => {
            warn!("Classification timed out after {}ms", budget.as_millis());
            0
        }
    }
}
