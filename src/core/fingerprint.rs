use std::collections::HashSet;
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

lazy_static! {
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "the", "and", "or", "of", "for", "to", "in", "on", "at", "by",
        "with", "is", "are", "i", "me", "my", "we", "our", "please", "show",
        "find", "want", "need", "looking", "some", "any",
    ]
    .into_iter()
    .collect();
}


/// Lower-cases, drops stop words and collapses whitespace.
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|word| !STOP_WORDS.contains(word.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}


#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_normalized(normalized: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn of_query(text: &str) -> Self {
        Self::from_normalized(&normalize_query(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12.min(self.0.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_drops_stop_words_and_case() {
        assert_eq!(normalize_query("Show me  THE 4K TV"), "4k tv");
        assert_eq!(normalize_query("  running   shoes for men "), "running shoes men");
    }

    #[test]
    fn test_equal_normalized_text_equal_fingerprint() {
        assert_eq!(
            Fingerprint::of_query("The 4K TV under $500"),
            Fingerprint::of_query("4k   tv under $500"),
        );
    }

    #[test]
    fn test_different_text_different_fingerprint() {
        assert_ne!(Fingerprint::of_query("4k tv"), Fingerprint::of_query("8k tv"));
        assert_ne!(Fingerprint::of_query("tv stand"), Fingerprint::of_query("stand tv"));
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = Fingerprint::of_query("laptop");
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp.to_string().len(), 12);
    }

    proptest! {
        #[test]
        fn prop_case_and_spacing_do_not_change_fingerprint(words in proptest::collection::vec("[a-z0-9]{1,8}", 1..6)) {
            let plain = words.join(" ");
            let noisy = format!("  {}  ", words.iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join("   "));
            prop_assert_eq!(Fingerprint::of_query(&plain), Fingerprint::of_query(&noisy));
        }

        #[test]
        fn prop_stop_words_are_ignored(words in proptest::collection::vec("[a-z0-9]{3,8}", 1..6)) {
            let plain = words.join(" ");
            let padded = format!("the {} please", words.join(" for "));
            prop_assert_eq!(Fingerprint::of_query(&plain), Fingerprint::of_query(&padded));
        }
    }
}
