use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

use super::models::{
    BuildParams, ExplicitFilter, FilterClause, FilterField, FilterOp, FilterValue, MatchMode,
    RankingProfile, StructuredQuery, TextClause, TextField, VectorClause,
};
use crate::core::config::PipelineConfig;
use crate::toolkit::expansion::ExpansionResult;

pub const VECTOR_FIELD: &str = "embedding";


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Nothing to query: no terms, no filters and empty text")]
    NothingToQuery,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryBuilderConfig {
    pub vector_k: usize,
    pub vector_k_wide: usize,
    pub wide_term_threshold: usize,
    pub result_limit: usize,
}

impl Default for QueryBuilderConfig {
    fn default() -> Self {
        Self {
            vector_k: 50,
            vector_k_wide: 1000,
            wide_term_threshold: 10,
            result_limit: 50,
        }
    }
}

impl From<&PipelineConfig> for QueryBuilderConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            vector_k: config.vector_k,
            vector_k_wide: config.vector_k_wide,
            wide_term_threshold: config.wide_term_threshold,
            result_limit: config.result_limit,
        }
    }
}


/// Pure transform from an expansion plus explicit filters to a `StructuredQuery`.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    config: QueryBuilderConfig,
}

impl QueryBuilder {
    pub fn new(config: QueryBuilderConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        expansion: &ExpansionResult,
        filters: &[ExplicitFilter],
        params: &BuildParams,
    ) -> Result<StructuredQuery, BuildError> {
        let clean_text = expansion.original_text.trim();
        let filter_clauses = validate_filters(filters);

        if expansion.merged_terms.is_empty() && filter_clauses.is_empty() && clean_text.is_empty() {
            return Err(BuildError::NothingToQuery);
        }

        let mut text_clauses = Vec::with_capacity(expansion.merged_terms.len() + 1);
        let broad = !expansion.merged_terms.is_empty();
        if broad {
            if !clean_text.is_empty() {
                text_clauses.push(TextClause {
                    field: TextField::Title,
                    term: clean_text.to_string(),
                    mode: MatchMode::BroadRecall,
                });
            }
            text_clauses.extend(expansion.merged_terms.iter().map(|term| TextClause {
                field: TextField::Attributes,
                term: term.clone(),
                mode: MatchMode::BroadRecall,
            }));
        } else if !clean_text.is_empty() {
            text_clauses.push(TextClause {
                field: TextField::Title,
                term: clean_text.to_string(),
                mode: MatchMode::Exact,
            });
        }

        let vector_clause = expansion.vector.as_ref().filter(|v| !v.is_empty()).map(|vector| {
            let k = if broad && expansion.merged_terms.len() > self.config.wide_term_threshold {
                self.config.vector_k_wide
            } else {
                self.config.vector_k
            };
            VectorClause {
                field: VECTOR_FIELD.to_string(),
                vector: vector.clone(),
                k,
            }
        });

        let ranking_profile = select_profile(
            vector_clause.is_some(),
            !filter_clauses.is_empty(),
            expansion.degraded,
        );

        debug!(
            "Built query: text={}, vector={}, filters={}, profile={:?}",
            text_clauses.len(),
            vector_clause.is_some(),
            filter_clauses.len(),
            ranking_profile
        );

        Ok(StructuredQuery {
            text_clauses,
            vector_clause,
            filter_clauses,
            ranking_profile,
            result_limit: params.result_limit.unwrap_or(self.config.result_limit),
            trace_budget_ms: params.trace_budget_ms,
        })
    }

    /// The floor query: exact lexical match on the sanitized text, no expansion,
    /// no vector. `None` when there is nothing at all to search for.
    pub fn plain_lexical(
        &self,
        clean_text: &str,
        filters: &[ExplicitFilter],
        params: &BuildParams,
    ) -> Option<StructuredQuery> {
        let clean_text = clean_text.trim();
        let filter_clauses = validate_filters(filters);
        if clean_text.is_empty() && filter_clauses.is_empty() {
            return None;
        }
        let text_clauses = if clean_text.is_empty() {
            Vec::new()
        } else {
            vec![TextClause {
                field: TextField::Title,
                term: clean_text.to_string(),
                mode: MatchMode::BroadRecall,
            }]
        };
        Some(StructuredQuery {
            text_clauses,
            vector_clause: None,
            filter_clauses,
            ranking_profile: RankingProfile::LexicalConservative,
            result_limit: params.result_limit.unwrap_or(self.config.result_limit),
            trace_budget_ms: params.trace_budget_ms,
        })
    }
}


/// Decision table keyed on (has_vector_clause, has_filters, degraded).
pub fn select_profile(has_vector: bool, has_filters: bool, degraded: bool) -> RankingProfile {
    match (has_vector, has_filters, degraded) {
        (_, _, true) => RankingProfile::LexicalConservative,
        (true, true, false) => RankingProfile::HybridFiltered,
        (true, false, false) => RankingProfile::Hybrid,
        (false, true, false) => RankingProfile::LexicalFiltered,
        (false, false, false) => RankingProfile::Lexical,
    }
}


/// Drops filters whose field is not allow-listed or whose operator/value
/// combination is not valid for that field. Later duplicates of an identical
/// clause are dropped too.
pub fn validate_filters(filters: &[ExplicitFilter]) -> Vec<FilterClause> {
    let mut clauses: Vec<FilterClause> = Vec::with_capacity(filters.len());
    for filter in filters {
        let Ok(field) = FilterField::from_str(filter.field.trim()) else {
            warn!("Rejected filter on non-allow-listed field");
            continue;
        };
        let Some(value) = validate_value(field, filter.op, &filter.value) else {
            warn!("Rejected invalid {:?} filter on {:?}", filter.op, field);
            continue;
        };
        let clause = FilterClause {
            field,
            op: filter.op,
            value,
        };
        if !clauses.contains(&clause) {
            clauses.push(clause);
        }
    }
    clauses
}

fn validate_value(field: FilterField, op: FilterOp, value: &FilterValue) -> Option<FilterValue> {
    match (field, op, value) {
        (f, FilterOp::Eq | FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte, FilterValue::Number(n))
            if f.is_numeric() && n.is_finite() && *n >= 0.0 =>
        {
            Some(FilterValue::Number(*n))
        }
        (f, FilterOp::Between, FilterValue::Range { min, max })
            if f.is_numeric() && min.is_finite() && max.is_finite() && *min >= 0.0 && min <= max =>
        {
            Some(FilterValue::Range { min: *min, max: *max })
        }
        (FilterField::Brand | FilterField::Category, FilterOp::Eq, FilterValue::Text(t))
            if !t.trim().is_empty() =>
        {
            Some(FilterValue::Text(t.trim().to_string()))
        }
        (FilterField::Brand | FilterField::Category, FilterOp::In, FilterValue::List(items)) => {
            let items: Vec<String> = items
                .iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect();
            (!items.is_empty()).then_some(FilterValue::List(items))
        }
        (FilterField::InStock, FilterOp::Eq, FilterValue::Bool(b)) => Some(FilterValue::Bool(*b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::routing::ModelTier;

    fn expansion(text: &str, terms: &[&str], vector: Option<Vec<f32>>, degraded: bool) -> ExpansionResult {
        ExpansionResult {
            original_text: text.to_string(),
            rule_terms: terms.iter().map(|t| t.to_string()).collect(),
            model_terms: Vec::new(),
            merged_terms: terms.iter().map(|t| t.to_string()).collect(),
            vector,
            degraded,
            tier: ModelTier::LowCost,
            entity_count: 0,
        }
    }

    fn params() -> BuildParams {
        BuildParams {
            result_limit: None,
            trace_budget_ms: 180,
        }
    }

    #[test]
    fn test_broad_recall_with_terms() {
        let builder = QueryBuilder::default();
        let q = builder
            .build(&expansion("4k tv", &["UHD", "HDR10"], None, false), &[], &params())
            .unwrap();
        assert_eq!(q.text_clauses.len(), 3);
        assert!(q.text_clauses.iter().all(|c| c.mode == MatchMode::BroadRecall));
        assert_eq!(q.text_clauses[0].term, "4k tv");
        assert_eq!(q.ranking_profile, RankingProfile::Lexical);
        assert_eq!(q.result_limit, 50);
        assert_eq!(q.trace_budget_ms, 180);
    }

    #[test]
    fn test_exact_phrase_without_terms() {
        let builder = QueryBuilder::default();
        let q = builder
            .build(&expansion("blue widget", &[], None, false), &[], &params())
            .unwrap();
        assert_eq!(q.text_clauses.len(), 1);
        assert_eq!(q.text_clauses[0].mode, MatchMode::Exact);
        assert_eq!(q.text_clauses[0].term, "blue widget");
    }

    #[test]
    fn test_vector_k_scales_with_term_count() {
        let builder = QueryBuilder::default();
        let few = builder
            .build(&expansion("tv", &["a"], Some(vec![0.1, 0.2]), false), &[], &params())
            .unwrap();
        assert_eq!(few.vector_clause.as_ref().map(|v| v.k), Some(50));

        let many_terms: Vec<String> = (0..11).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = many_terms.iter().map(String::as_str).collect();
        let many = builder
            .build(&expansion("tv", &refs, Some(vec![0.1, 0.2]), false), &[], &params())
            .unwrap();
        assert_eq!(many.vector_clause.as_ref().map(|v| v.k), Some(1000));
        assert_eq!(many.ranking_profile, RankingProfile::Hybrid);
    }

    #[test]
    fn test_filters_validated_against_allow_list() {
        let builder = QueryBuilder::default();
        let filters = vec![
            ExplicitFilter::new("price", FilterOp::Lt, FilterValue::Number(500.0)),
            ExplicitFilter::new("internal_cost", FilterOp::Lt, FilterValue::Number(1.0)),
            ExplicitFilter::new("brand", FilterOp::Lt, FilterValue::Text("Sony".to_string())),
            ExplicitFilter::new("brand", FilterOp::In, FilterValue::List(vec!["Sony".to_string()])),
            ExplicitFilter::new("price", FilterOp::Lt, FilterValue::Number(500.0)),
        ];
        let q = builder
            .build(&expansion("tv", &["UHD"], Some(vec![1.0]), false), &filters, &params())
            .unwrap();
        assert_eq!(q.filter_clauses.len(), 2);
        assert_eq!(q.filter_clauses[0].field, FilterField::Price);
        assert_eq!(q.filter_clauses[1].field, FilterField::Brand);
        assert_eq!(q.ranking_profile, RankingProfile::HybridFiltered);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let clauses = validate_filters(&[
            ExplicitFilter::new("price", FilterOp::Between, FilterValue::Range { min: 300.0, max: 100.0 }),
            ExplicitFilter::new("rating", FilterOp::Gte, FilterValue::Number(f64::NAN)),
            ExplicitFilter::new("in_stock", FilterOp::Eq, FilterValue::Bool(true)),
        ]);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].field, FilterField::InStock);
    }

    #[test]
    fn test_degraded_selects_conservative_profile() {
        let builder = QueryBuilder::default();
        let q = builder
            .build(&expansion("tv", &["UHD"], Some(vec![1.0]), true), &[], &params())
            .unwrap();
        assert_eq!(q.ranking_profile, RankingProfile::LexicalConservative);
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(select_profile(true, true, false), RankingProfile::HybridFiltered);
        assert_eq!(select_profile(true, false, false), RankingProfile::Hybrid);
        assert_eq!(select_profile(false, true, false), RankingProfile::LexicalFiltered);
        assert_eq!(select_profile(false, false, false), RankingProfile::Lexical);
        for (v, f) in [(true, true), (true, false), (false, true), (false, false)] {
            assert_eq!(select_profile(v, f, true), RankingProfile::LexicalConservative);
        }
    }

    #[test]
    fn test_build_error_iff_nothing_to_query() {
        let builder = QueryBuilder::default();
        let empty = expansion("", &[], None, false);
        assert_eq!(builder.build(&empty, &[], &params()), Err(BuildError::NothingToQuery));

        let filter_only = [ExplicitFilter::new("category", FilterOp::Eq, FilterValue::Text("tv".to_string()))];
        let q = builder.build(&empty, &filter_only, &params()).unwrap();
        assert!(q.text_clauses.is_empty());
        assert_eq!(q.filter_clauses.len(), 1);

        assert!(builder.build(&expansion("", &["UHD"], None, false), &[], &params()).is_ok());
        assert!(builder.build(&expansion("tv", &[], None, false), &[], &params()).is_ok());
    }

    #[test]
    fn test_explicit_result_limit() {
        let builder = QueryBuilder::default();
        let q = builder
            .build(
                &expansion("tv", &[], None, false),
                &[],
                &BuildParams {
                    result_limit: Some(10),
                    trace_budget_ms: 5,
                },
            )
            .unwrap();
        assert_eq!(q.result_limit, 10);
    }

    #[test]
    fn test_plain_lexical_floor() {
        let builder = QueryBuilder::default();
        let q = builder.plain_lexical("4k tv", &[], &params()).unwrap();
        assert!(q.vector_clause.is_none());
        assert_eq!(q.ranking_profile, RankingProfile::LexicalConservative);
        assert!(builder.plain_lexical("  ", &[], &params()).is_none());
    }
}
