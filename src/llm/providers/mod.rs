

pub mod base;
pub mod cerebras;
pub mod ollama;

pub use base::{Completion, LlmProvider, LlmProviderError, Prompt, ResponseMode, TokenUsage};
pub use cerebras::CerebrasProvider;
pub use ollama::OllamaProvider;
