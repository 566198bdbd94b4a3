

pub mod core;
pub mod db;
pub mod llm;
pub mod toolkit;
pub mod utils;

pub use utils::{safe_truncate, safe_truncate_ellipsis};


pub use core::config::PipelineConfig;
pub use core::error::{PipelineError, PipelineErrorKind, Result, ShopsenseError};
pub use db::{ExecutionResult, HttpSearchExecutor, SearchExecutor};
pub use llm::{ModelClient, ModelTier};
pub use toolkit::orchestrator::{Orchestrator, SearchOutcome};
pub use toolkit::query_builder::{ExplicitFilter, StructuredQuery};


pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";


pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";


pub const DEFAULT_EMBEDDING_CACHE_SIZE: usize = 1000;


pub const DEFAULT_BUDGET_MS: u64 = 250;
