

pub mod models;
pub mod pipeline;

pub use models::{PipelineTrace, ReviewRecord, SearchOutcome};
pub use pipeline::Orchestrator;
