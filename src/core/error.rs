

use thiserror::Error;


#[derive(Error, Debug)]
pub enum ShopsenseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<config::ConfigError> for ShopsenseError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}


pub type Result<T> = std::result::Result<T, ShopsenseError>;


#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineErrorKind {
    ExecutionUnavailable,
    FallbackExhausted,
    PipelineTimeout,
}


/// The only error surfaced to callers of the pipeline.
///
/// Always carries the sanitized query text so the caller can render a
/// "no results" page instead of an internal failure.
#[derive(Error, Debug, Clone)]
#[error("{kind}: {message} (query: {query_text:?})")]
pub struct PipelineError {
    pub kind: PipelineErrorKind,
    pub query_text: String,
    pub message: String,
}

impl PipelineError {
    pub fn new(
        kind: PipelineErrorKind,
        query_text: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            query_text: query_text.into(),
            message: message.into(),
        }
    }

    pub fn execution_unavailable(query_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(PipelineErrorKind::ExecutionUnavailable, query_text, message)
    }
}
