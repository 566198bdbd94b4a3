use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::models::{FallbackSignal, FallbackStage, FallbackState};
use crate::core::config::PipelineConfig;
use crate::db::{ExecutionError, ExecutionResult, SearchExecutor};
use crate::toolkit::query_builder::{
    select_profile, FilterClause, FilterOp, FilterValue, MatchMode, RankingProfile, StructuredQuery,
};
use crate::utils::elapsed_ms;


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationConfig {
    pub min_results: usize,
    pub max_relaxations: usize,
    pub widen_percent: f64,
    pub execution_timeout: Duration,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            min_results: 50,
            max_relaxations: 2,
            widen_percent: 15.0,
            execution_timeout: Duration::from_millis(150),
        }
    }
}

impl From<&PipelineConfig> for RelaxationConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_results: config.min_results,
            max_relaxations: config.max_relaxations,
            widen_percent: config.widen_percent,
            execution_timeout: Duration::from_millis(config.execution_timeout_ms),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub stage: FallbackStage,
    pub result_count: Option<usize>,
    pub latency_ms: u64,
    pub error: Option<String>,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaxationOutcome {
    /// The query whose results are returned.
    pub query: StructuredQuery,
    pub execution: ExecutionResult,
    pub state: FallbackState,
    pub attempts: Vec<AttemptRecord>,
}


/// Drops the filter clause with the lowest relax weight (first one on ties).
pub fn relax_filters(query: &StructuredQuery) -> StructuredQuery {
    let mut relaxed = query.clone();
    let lowest = relaxed
        .filter_clauses
        .iter()
        .enumerate()
        .min_by_key(|(idx, clause)| (clause.field.relax_weight(), *idx))
        .map(|(idx, _)| idx);
    if let Some(idx) = lowest {
        let dropped = relaxed.filter_clauses.remove(idx);
        debug!("Relaxed filter on {:?}", dropped.field);
    }
    if relaxed.ranking_profile != RankingProfile::LexicalConservative {
        relaxed.ranking_profile =
            select_profile(relaxed.has_vector_clause(), relaxed.has_filters(), false);
    }
    relaxed
}


fn widen(clause: &FilterClause, percent: f64) -> FilterClause {
    let p = percent / 100.0;
    let value = match (clause.op, &clause.value) {
        (FilterOp::Lt | FilterOp::Lte, FilterValue::Number(n)) => FilterValue::Number(n * (1.0 + p)),
        (FilterOp::Gt | FilterOp::Gte, FilterValue::Number(n)) => FilterValue::Number(n * (1.0 - p)),
        (FilterOp::Between, FilterValue::Range { min, max }) => FilterValue::Range {
            min: min * (1.0 - p),
            max: max * (1.0 + p),
        },
        (FilterOp::Eq, FilterValue::Number(n)) => {
            return FilterClause {
                field: clause.field,
                op: FilterOp::Between,
                value: FilterValue::Range {
                    min: n * (1.0 - p),
                    max: n * (1.0 + p),
                },
            };
        }
        (_, other) => other.clone(),
    };
    FilterClause {
        field: clause.field,
        op: clause.op,
        value,
    }
}


/// Every text clause becomes permissive and numeric bounds widen by `percent`.
pub fn broaden(query: &StructuredQuery, percent: f64) -> StructuredQuery {
    let mut broadened = query.clone();
    for clause in &mut broadened.text_clauses {
        clause.mode = MatchMode::Permissive;
    }
    broadened.filter_clauses = query
        .filter_clauses
        .iter()
        .map(|clause| {
            if clause.field.is_numeric() {
                widen(clause, percent)
            } else {
                clause.clone()
            }
        })
        .collect();
    broadened
}


/// Drives the results-count half of the fallback state machine against the
/// search executor: Primary → Relaxed → Broadened, then the Failed floor.
pub struct RelaxationController {
    executor: Arc<dyn SearchExecutor>,
    config: RelaxationConfig,
}

impl RelaxationController {
    pub fn new(executor: Arc<dyn SearchExecutor>, config: RelaxationConfig) -> Self {
        info!(
            "RelaxationController initialized: min_results={}, max_relaxations={}, widen={}%",
            config.min_results, config.max_relaxations, config.widen_percent
        );
        Self { executor, config }
    }

    pub fn config(&self) -> &RelaxationConfig {
        &self.config
    }

    async fn execute(&self, query: &StructuredQuery) -> Result<ExecutionResult, ExecutionError> {
        match timeout(self.config.execution_timeout, self.executor.execute(query)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Unavailable(format!(
                "execution timed out after {}ms",
                self.config.execution_timeout.as_millis()
            ))),
        }
    }

    /// Executes `query` from the current stage of `state` until enough results
    /// come back or the state fails. `floor` is the plain lexical query run on
    /// the Failed path. The deadline is checked before each retry.
    pub async fn drive(
        &self,
        mut state: FallbackState,
        query: StructuredQuery,
        floor: Option<StructuredQuery>,
        deadline: Option<Instant>,
    ) -> Result<RelaxationOutcome, ExecutionError> {
        let mut attempts = Vec::new();
        let mut current = query;
        let mut best: Option<(StructuredQuery, ExecutionResult)> = None;
        let mut last_error = None;

        while !state.is_terminal() {
            if !attempts.is_empty() && deadline.is_some_and(|d| Instant::now() >= d) {
                state.advance(FallbackSignal::BudgetExceeded, self.config.max_relaxations);
                break;
            }

            let start = Instant::now();
            let outcome = self.execute(&current).await;
            let stage = state.stage;

            match outcome {
                Ok(result) => {
                    attempts.push(AttemptRecord {
                        stage,
                        result_count: Some(result.result_count),
                        latency_ms: elapsed_ms(start),
                        error: None,
                    });
                    if result.result_count >= self.config.min_results {
                        state.advance(FallbackSignal::Enough, self.config.max_relaxations);
                        return Ok(RelaxationOutcome {
                            query: current,
                            execution: result,
                            state,
                            attempts,
                        });
                    }

                    debug!(
                        "Thin results at {}: {} < {}",
                        stage, result.result_count, self.config.min_results
                    );
                    if best.as_ref().is_none_or(|(_, b)| result.result_count > b.result_count) {
                        best = Some((current.clone(), result));
                    }
                    match state.advance(FallbackSignal::ThinResults, self.config.max_relaxations) {
                        FallbackStage::Relaxed => current = relax_filters(&current),
                        FallbackStage::Broadened => {
                            current = broaden(&current, self.config.widen_percent)
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    warn!("Execution failed at {}: {}", stage, e);
                    attempts.push(AttemptRecord {
                        stage,
                        result_count: None,
                        latency_ms: elapsed_ms(start),
                        error: Some(e.to_string()),
                    });
                    last_error = Some(e);
                    state.advance(FallbackSignal::ExecutionFailed, self.config.max_relaxations);
                }
            }
        }

        self.floor(state, floor, best, attempts, last_error).await
    }

    /// The Failed path: run the plain lexical floor and return whichever of it
    /// and the best earlier attempt found more results.
    pub async fn floor(
        &self,
        state: FallbackState,
        floor: Option<StructuredQuery>,
        best: Option<(StructuredQuery, ExecutionResult)>,
        mut attempts: Vec<AttemptRecord>,
        last_error: Option<ExecutionError>,
    ) -> Result<RelaxationOutcome, ExecutionError> {
        let floor_result = match floor {
            Some(query) => {
                let start = Instant::now();
                let outcome = self.execute(&query).await;
                attempts.push(AttemptRecord {
                    stage: FallbackStage::Failed,
                    result_count: outcome.as_ref().ok().map(|r| r.result_count),
                    latency_ms: elapsed_ms(start),
                    error: outcome.as_ref().err().map(|e| e.to_string()),
                });
                Some(outcome.map(|result| (query, result)))
            }
            None => None,
        };

        let chosen = match (floor_result, best) {
            (Some(Ok(floor)), Some(best)) => {
                if best.1.result_count > floor.1.result_count {
                    best
                } else {
                    floor
                }
            }
            (Some(Ok(floor)), None) => floor,
            (Some(Err(_)), Some(best)) | (None, Some(best)) => best,
            (Some(Err(e)), None) => return Err(e),
            (None, None) => {
                return Err(last_error.unwrap_or_else(|| {
                    ExecutionError::Unavailable("no query to execute".to_string())
                }));
            }
        };

        info!(
            "Fallback floor returned {} results ({})",
            chosen.1.result_count, state.reason
        );
        Ok(RelaxationOutcome {
            query: chosen.0,
            execution: chosen.1,
            state,
            attempts,
        })
    }
}
