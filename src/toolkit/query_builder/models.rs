use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchMode {
    /// Any term may match; ranked by match density.
    BroadRecall,
    Exact,
    /// Relaxation's last resort: fuzzy, any-term, no minimum-should-match.
    Permissive,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TextField {
    Title,
    Attributes,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextClause {
    pub field: TextField,
    pub term: String,
    pub mode: MatchMode,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorClause {
    pub field: String,
    pub vector: Vec<f32>,
    pub k: usize,
}


/// Allow-listed filter fields. Anything that does not parse into this enum
/// never reaches a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FilterField {
    Price,
    Brand,
    Category,
    Rating,
    InStock,
}

impl FilterField {
    /// Lower weight is relaxed first.
    pub fn relax_weight(&self) -> u8 {
        match self {
            Self::InStock => 1,
            Self::Rating => 2,
            Self::Brand => 3,
            Self::Price => 4,
            Self::Category => 5,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Price | Self::Rating)
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    In,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Number(f64),
    Range { min: f64, max: f64 },
    Bool(bool),
    Text(String),
    List(Vec<String>),
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: FilterValue,
}


/// A caller-supplied filter before allow-list validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl ExplicitFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }
}

impl FromStr for ExplicitFilter {
    type Err = String;

    /// `field:op:value`; lists use `|`, ranges use `..` (`price:between:100..300`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (Some(field), Some(op), Some(raw)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected field:op:value, got {s:?}"));
        };
        let op = FilterOp::from_str(op.trim()).map_err(|_| format!("unknown operator {op:?}"))?;
        let raw = raw.trim();

        let value = match op {
            FilterOp::Between => {
                let (min, max) = raw
                    .split_once("..")
                    .ok_or_else(|| format!("between expects min..max, got {raw:?}"))?;
                FilterValue::Range {
                    min: min.trim().parse().map_err(|_| format!("bad range min {min:?}"))?,
                    max: max.trim().parse().map_err(|_| format!("bad range max {max:?}"))?,
                }
            }
            FilterOp::In => FilterValue::List(
                raw.split('|')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            _ => {
                if let Ok(n) = raw.parse::<f64>() {
                    FilterValue::Number(n)
                } else if let Ok(b) = raw.parse::<bool>() {
                    FilterValue::Bool(b)
                } else {
                    FilterValue::Text(raw.to_string())
                }
            }
        };

        Ok(Self::new(field.trim(), op, value))
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RankingProfile {
    Hybrid,
    HybridFiltered,
    Lexical,
    LexicalFiltered,
    /// Lexical-only profile used whenever expansion ran degraded.
    LexicalConservative,
}


/// The only artifact handed to the search-execution collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub text_clauses: Vec<TextClause>,
    pub vector_clause: Option<VectorClause>,
    pub filter_clauses: Vec<FilterClause>,
    pub ranking_profile: RankingProfile,
    pub result_limit: usize,
    pub trace_budget_ms: u64,
}

impl StructuredQuery {
    pub fn has_vector_clause(&self) -> bool {
        self.vector_clause.is_some()
    }

    pub fn has_filters(&self) -> bool {
        !self.filter_clauses.is_empty()
    }

    pub fn match_mode(&self) -> Option<MatchMode> {
        self.text_clauses.first().map(|c| c.mode)
    }
}


#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParams {
    pub result_limit: Option<usize>,
    pub trace_budget_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_filter() {
        let f: ExplicitFilter = "price:lt:500".parse().unwrap();
        assert_eq!(f, ExplicitFilter::new("price", FilterOp::Lt, FilterValue::Number(500.0)));
    }

    #[test]
    fn test_parse_list_and_range() {
        let brands: ExplicitFilter = "brand:in:Sony| LG |".parse().unwrap();
        assert_eq!(
            brands.value,
            FilterValue::List(vec!["Sony".to_string(), "LG".to_string()])
        );

        let range: ExplicitFilter = "price:between:100..300".parse().unwrap();
        assert_eq!(range.value, FilterValue::Range { min: 100.0, max: 300.0 });
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("price".parse::<ExplicitFilter>().is_err());
        assert!("price:approx:5".parse::<ExplicitFilter>().is_err());
        assert!("price:between:100".parse::<ExplicitFilter>().is_err());
    }

    #[test]
    fn test_filter_field_allow_list() {
        assert_eq!(FilterField::from_str("in_stock").unwrap(), FilterField::InStock);
        assert!(FilterField::from_str("password").is_err());
        assert!(FilterField::Rating.relax_weight() < FilterField::Category.relax_weight());
    }

    #[test]
    fn test_structured_query_serializes_typed_fields() {
        let query = StructuredQuery {
            text_clauses: vec![TextClause {
                field: TextField::Title,
                term: "4k tv".to_string(),
                mode: MatchMode::BroadRecall,
            }],
            vector_clause: None,
            filter_clauses: vec![FilterClause {
                field: FilterField::Price,
                op: FilterOp::Lt,
                value: FilterValue::Number(500.0),
            }],
            ranking_profile: RankingProfile::LexicalFiltered,
            result_limit: 50,
            trace_budget_ms: 200,
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["text_clauses"][0]["mode"], "broad_recall");
        assert_eq!(json["filter_clauses"][0]["field"], "price");
        assert_eq!(json["ranking_profile"], "lexical_filtered");
        let back: StructuredQuery = serde_json::from_value(json).unwrap();
        assert_eq!(back, query);
    }
}
