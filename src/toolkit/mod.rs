

pub mod cache;
pub mod expansion;
pub mod orchestrator;
pub mod query_builder;
pub mod relaxation;
pub mod sanitizer;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheEntry, CacheStore, InMemoryCacheStore};
pub use expansion::{ExpansionEngine, ExpansionResult, RuleTable};
pub use orchestrator::{Orchestrator, SearchOutcome};
pub use query_builder::{ExplicitFilter, QueryBuilder, StructuredQuery};
pub use relaxation::{FallbackStage, FallbackState, RelaxationController};
pub use sanitizer::{sanitize, SanitizedText, Sanitizer};
