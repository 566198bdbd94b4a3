use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::fingerprint::Fingerprint;
use crate::db::ExecutionResult;
use crate::llm::routing::ModelTier;
use crate::toolkit::query_builder::StructuredQuery;
use crate::toolkit::relaxation::{AttemptRecord, FallbackReason, FallbackState};


/// A query that fell through to the Failed floor, kept for offline review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub query_text: String,
    pub fingerprint: Fingerprint,
    pub reason: FallbackReason,
    pub correlation_id: Uuid,
    pub recorded_at: DateTime<Utc>,
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrace {
    pub correlation_id: Uuid,
    pub fingerprint: Fingerprint,
    /// The whole query after sanitization, as reported back to callers.
    pub sanitized_text: String,
    /// Sanitized text with price phrases removed; what was expanded.
    pub query_text: String,
    pub redaction_count: usize,
    pub cache_hit: bool,
    /// Joined another request's in-flight build.
    pub coalesced: bool,
    pub degraded: bool,
    pub tier: Option<ModelTier>,
    pub fallback: FallbackState,
    pub attempts: Vec<AttemptRecord>,
    pub elapsed_ms: u64,
}

impl PipelineTrace {
    pub fn new(
        correlation_id: Uuid,
        fingerprint: Fingerprint,
        sanitized_text: String,
        query_text: String,
        redaction_count: usize,
    ) -> Self {
        Self {
            correlation_id,
            fingerprint,
            sanitized_text,
            query_text,
            redaction_count,
            cache_hit: false,
            coalesced: false,
            degraded: false,
            tier: None,
            fallback: FallbackState::new(),
            attempts: Vec::new(),
            elapsed_ms: 0,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: StructuredQuery,
    pub execution: ExecutionResult,
    pub trace: PipelineTrace,
}
