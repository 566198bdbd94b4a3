

pub mod similarity;
pub mod single_flight;
pub mod store;

pub use similarity::cosine_similarity;
pub use single_flight::{FlightOutcome, SingleFlight};
pub use store::{CacheEntry, CacheStats, CacheStore, InMemoryCacheStore, ScoredEntry};
