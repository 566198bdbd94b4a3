

pub mod constraints;
pub mod engine;
pub mod models;
pub mod rules;

pub use constraints::{extract_price, merge_filters, PriceExtraction};
pub use engine::{merge_terms, ExpansionConfig, ExpansionEngine, ExpansionRequest};
pub use models::{embedding_input, ExpansionError, ExpansionResult};
pub use rules::RuleTable;
