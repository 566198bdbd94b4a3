use lazy_static::lazy_static;
use regex::Regex;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionKind {
    Pii,
    Injection,
}


pub struct SanitizeRule {
    pub name: &'static str,
    pub kind: RedactionKind,
    pub regex: &'static Option<Regex>,
}

lazy_static! {
    // 13-19 digits, optionally grouped by single spaces or dashes.
    static ref RE_PAYMENT_CARD: Option<Regex> =
        Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").ok();

    static ref RE_NATIONAL_ID: Option<Regex> =
        Regex::new(r"\b\d{3}[- ]\d{2}[- ]\d{4}\b").ok();

    // Control sequences of the downstream query grammar.
    static ref RE_INJECTION: Option<Regex> =
        Regex::new(r"(?:;|--|/\*|\*/|`|&&|\|\||\\|[\x00-\x08\x0E-\x1F\x7F])").ok();

    static ref RULES: Vec<SanitizeRule> = vec![
        SanitizeRule {
            name: "payment_card",
            kind: RedactionKind::Pii,
            regex: &RE_PAYMENT_CARD,
        },
        SanitizeRule {
            name: "national_id",
            kind: RedactionKind::Pii,
            regex: &RE_NATIONAL_ID,
        },
        SanitizeRule {
            name: "injection",
            kind: RedactionKind::Injection,
            regex: &RE_INJECTION,
        },
    ];
}


/// Rules in application order.
pub fn all_rules() -> &'static [SanitizeRule] {
    &RULES
}
