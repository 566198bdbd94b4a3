use std::collections::{HashMap, HashSet};
use std::path::Path;

use lazy_static::lazy_static;
use tracing::{debug, info};

use crate::core::error::{Result, ShopsenseError};


lazy_static! {
    static ref BUILTIN_RULES: Vec<(&'static str, &'static [&'static str])> = vec![
        ("4k tv", &["UHD", "HDR10", "Dolby Vision", "120Hz refresh"][..]),
        ("oled tv", &["OLED", "HDR10", "Dolby Vision", "infinite contrast"][..]),
        ("gaming laptop", &["RTX", "high refresh rate", "dedicated GPU", "144Hz"][..]),
        ("laptop", &["notebook", "ultrabook"][..]),
        ("wireless earbuds", &["true wireless", "Bluetooth", "noise cancelling"][..]),
        ("headphones", &["over-ear", "headset"][..]),
        ("running shoes", &["trainers", "sneakers", "cushioned"][..]),
        ("sofa", &["couch", "settee"][..]),
        ("phone case", &["cover", "bumper"][..]),
        ("smartwatch", &["fitness tracker", "wearable"][..]),
        ("mechanical keyboard", &["hot-swappable", "tactile switches"][..]),
        ("coffee maker", &["espresso machine", "drip brewer"][..]),
    ];
}


fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}


/// Static phrase → term table. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    /// Sorted longest phrase (in words) first.
    rules: Vec<(Vec<String>, Vec<String>)>,
}

impl RuleTable {
    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        let mut rules: Vec<(Vec<String>, Vec<String>)> = map
            .into_iter()
            .map(|(phrase, terms)| (words(&phrase), terms))
            .filter(|(phrase, _)| !phrase.is_empty())
            .collect();
        rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { rules }
    }

    pub fn builtin() -> Self {
        Self::from_map(
            BUILTIN_RULES
                .iter()
                .map(|(phrase, terms)| {
                    (phrase.to_string(), terms.iter().map(|t| t.to_string()).collect())
                })
                .collect(),
        )
    }

    /// Parses `{"phrase": ["term", ...]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let map: HashMap<String, Vec<String>> = serde_json::from_str(json)?;
        Ok(Self::from_map(map))
    }

    /// Built-in rules overlaid with the file's entries (file wins per phrase).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: HashMap<String, Vec<String>> = serde_json::from_str(&raw).map_err(|e| {
            ShopsenseError::Config(format!("invalid rule table {}: {e}", path.display()))
        })?;
        let mut merged: HashMap<String, Vec<String>> = BUILTIN_RULES
            .iter()
            .map(|(phrase, terms)| (phrase.to_string(), terms.iter().map(|t| t.to_string()).collect()))
            .collect();
        let loaded = file.len();
        merged.extend(file.into_iter().map(|(phrase, terms)| (phrase.to_lowercase(), terms)));
        info!("Loaded {} rules from {}", loaded, path.display());
        Ok(Self::from_map(merged))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Terms for every phrase contained in `text` as whole words, longest
    /// phrase first, deduplicated case-insensitively and capped at `cap`.
    /// A miss is an empty list.
    pub fn lookup(&self, text: &str, cap: usize) -> Vec<String> {
        let tokens = words(text);
        let mut seen = HashSet::new();
        let mut terms = Vec::new();

        for (phrase, phrase_terms) in &self.rules {
            if !tokens.windows(phrase.len()).any(|w| w == phrase.as_slice()) {
                continue;
            }
            debug!("Rule hit: {}", phrase.join(" "));
            for term in phrase_terms {
                if terms.len() >= cap {
                    return terms;
                }
                let term = term.trim();
                if !term.is_empty() && seen.insert(term.to_lowercase()) {
                    terms.push(term.to_string());
                }
            }
        }
        terms
    }
}
