

pub mod client;
pub mod embeddings;
pub mod factory;
pub mod prompt;
pub mod providers;
pub mod routing;

pub use client::{Classification, ExpansionTerm, ModelClient, ModelError, ProviderModelClient};
pub use embeddings::EmbeddingGenerator;
pub use factory::{LlmProviderFactory, ModelClientFactory};
pub use routing::{ModelTier, RoutingPolicy, RoutingSignals};
