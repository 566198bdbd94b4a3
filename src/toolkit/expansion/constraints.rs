use std::collections::HashSet;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::toolkit::query_builder::{ExplicitFilter, FilterField, FilterOp, FilterValue};
use crate::utils::collapse_whitespace;

const PRICE_FIELD: &str = "price";

lazy_static! {
    static ref RE_BETWEEN: Option<Regex> = Regex::new(
        r"(?i)\bbetween\s+\$?(\d+(?:\.\d+)?)\s+(?:and|to)\s+\$?(\d+(?:\.\d+)?)\b"
    )
    .ok();
    static ref RE_DASH_RANGE: Option<Regex> =
        Regex::new(r"\$(\d+(?:\.\d+)?)\s*-\s*\$?(\d+(?:\.\d+)?)\b").ok();
    static ref RE_UPPER: Option<Regex> = Regex::new(
        r"(?i)\b(under|below|less than|cheaper than|up to)\s+\$?(\d+(?:\.\d+)?)\b"
    )
    .ok();
    static ref RE_LOWER: Option<Regex> =
        Regex::new(r"(?i)\b(over|above|more than|at least)\s+\$?(\d+(?:\.\d+)?)\b").ok();
}


#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceExtraction {
    pub filters: Vec<ExplicitFilter>,
    /// The text with the matched price phrases removed.
    pub remainder: String,
}


fn number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}


/// Pulls price constraints out of free text: "under $500", "over 200",
/// "between $100 and $300", "$100-$300". At most one constraint is taken;
/// ranges take precedence over one-sided bounds.
pub fn extract_price(text: &str) -> PriceExtraction {
    let mut remainder = text.to_string();
    let mut filters = Vec::new();

    for range in [&*RE_BETWEEN, &*RE_DASH_RANGE].into_iter().flatten() {
        let Some(caps) = range.captures(&remainder) else {
            continue;
        };
        let (Some(a), Some(b)) = (
            caps.get(1).and_then(|m| number(m.as_str())),
            caps.get(2).and_then(|m| number(m.as_str())),
        ) else {
            continue;
        };
        filters.push(ExplicitFilter::new(
            PRICE_FIELD,
            FilterOp::Between,
            FilterValue::Range {
                min: a.min(b),
                max: a.max(b),
            },
        ));
        remainder = range.replace(&remainder, " ").into_owned();
        break;
    }

    if filters.is_empty() {
        for (bound, lower) in [(&*RE_UPPER, false), (&*RE_LOWER, true)] {
            let Some(regex) = bound.as_ref() else {
                continue;
            };
            let Some(caps) = regex.captures(&remainder) else {
                continue;
            };
            let Some(value) = caps.get(2).and_then(|m| number(m.as_str())) else {
                continue;
            };
            let keyword = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            let op = match (lower, keyword.as_str()) {
                (false, "up to") => FilterOp::Lte,
                (false, _) => FilterOp::Lt,
                (true, "at least") => FilterOp::Gte,
                (true, _) => FilterOp::Gt,
            };
            filters.push(ExplicitFilter::new(PRICE_FIELD, op, FilterValue::Number(value)));
            remainder = regex.replace(&remainder, " ").into_owned();
            break;
        }
    }

    PriceExtraction {
        filters,
        remainder: collapse_whitespace(&remainder),
    }
}


/// Caller filters first; extracted filters only for fields the caller left
/// unset. Fields compare as allow-listed fields, so a caller filter that will
/// be rejected later never hides an extracted one.
pub fn merge_filters(explicit: &[ExplicitFilter], extracted: Vec<ExplicitFilter>) -> Vec<ExplicitFilter> {
    let taken: HashSet<FilterField> = explicit
        .iter()
        .filter_map(|f| FilterField::from_str(f.field.trim()).ok())
        .collect();
    let mut merged = explicit.to_vec();
    for filter in extracted {
        match FilterField::from_str(filter.field.trim()) {
            Ok(field) if taken.contains(&field) => continue,
            _ => merged.push(filter),
        }
    }
    merged
}
