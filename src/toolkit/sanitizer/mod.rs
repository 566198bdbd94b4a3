

pub mod patterns;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::collapse_whitespace;
use patterns::{all_rules, RedactionKind};


#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizedText {
    pub text: String,
    pub redaction_count: usize,
    pub pii_count: usize,
    pub injection_count: usize,
}

impl SanitizedText {
    pub fn is_clean(&self) -> bool {
        self.redaction_count == 0
    }
}


/// Strips PII and query-grammar control sequences. Total and idempotent:
/// passes repeat until nothing matches, and every match removes at least one
/// non-whitespace character, so the loop always ends.
pub fn sanitize(text: &str) -> SanitizedText {
    let mut current = collapse_whitespace(text);
    let mut pii_count = 0;
    let mut injection_count = 0;

    loop {
        let mut pass_matches = 0;
        for rule in all_rules() {
            let Some(regex) = rule.regex.as_ref() else {
                continue;
            };
            let hits = regex.find_iter(&current).count();
            if hits == 0 {
                continue;
            }
            current = regex.replace_all(&current, " ").into_owned();
            pass_matches += hits;
            match rule.kind {
                RedactionKind::Pii => pii_count += hits,
                RedactionKind::Injection => injection_count += hits,
            }
        }
        current = collapse_whitespace(&current);
        if pass_matches == 0 {
            break;
        }
    }

    SanitizedText {
        text: current,
        redaction_count: pii_count + injection_count,
        pii_count,
        injection_count,
    }
}


/// Process-wide sanitizer that keeps a redaction counter for observability.
#[derive(Debug, Default)]
pub struct Sanitizer {
    redactions_total: AtomicU64,
    sanitized_total: AtomicU64,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sanitize(&self, text: &str) -> SanitizedText {
        let result = sanitize(text);
        self.sanitized_total.fetch_add(1, Ordering::Relaxed);
        if result.redaction_count > 0 {
            self.redactions_total
                .fetch_add(result.redaction_count as u64, Ordering::Relaxed);
            debug!(
                "Sanitizer redacted {} span(s) (pii={}, injection={})",
                result.redaction_count, result.pii_count, result.injection_count
            );
        }
        result
    }

    pub fn redactions_total(&self) -> u64 {
        self.redactions_total.load(Ordering::Relaxed)
    }

    pub fn sanitized_total(&self) -> u64 {
        self.sanitized_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_query_untouched() {
        let result = sanitize("4k tv under $500");
        assert_eq!(result.text, "4k tv under $500");
        assert!(result.is_clean());
    }

    #[test]
    fn test_sixteen_digit_card_redacted_once() {
        let result = sanitize("tv 4111111111111111 under $500");
        assert_eq!(result.text, "tv under $500");
        assert_eq!(result.redaction_count, 1);
        assert_eq!(result.pii_count, 1);
    }

    #[test]
    fn test_national_id_redacted() {
        let result = sanitize("order for 123-45-6789 please");
        assert_eq!(result.text, "order for please");
        assert_eq!(result.pii_count, 1);
    }

    #[test]
    fn test_injection_sequences_removed() {
        let result = sanitize("shoes; DROP TABLE products -- x");
        assert_eq!(result.text, "shoes DROP TABLE products x");
        assert_eq!(result.injection_count, 2);
    }

    #[test]
    fn test_card_exposed_by_injection_removal_is_caught() {
        let raw = "4111 1111;1111 1111";
        let once = sanitize(raw);
        assert!(!once.text.chars().any(|c| c.is_ascii_digit()), "{:?}", once.text);
        assert_eq!(sanitize(&once.text).text, once.text);
    }

    #[test]
    fn test_sanitizer_counts() {
        let sanitizer = Sanitizer::new();
        sanitizer.sanitize("laptop");
        sanitizer.sanitize("card 4111-1111-1111-1111; x");
        assert_eq!(sanitizer.sanitized_total(), 2);
        assert_eq!(sanitizer.redactions_total(), 2);
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(input in "\\PC{0,80}") {
            let once = sanitize(&input);
            let twice = sanitize(&once.text);
            prop_assert_eq!(&twice.text, &once.text);
            prop_assert_eq!(twice.redaction_count, 0);
        }

        #[test]
        fn prop_sanitize_idempotent_on_digit_noise(input in "[0-9 ;\\-/*|&]{0,60}") {
            let once = sanitize(&input);
            prop_assert_eq!(sanitize(&once.text).text, once.text);
        }

        #[test]
        fn prop_sanitize_is_total(input in any::<String>()) {
            let _ = sanitize(&input);
        }
    }
}
