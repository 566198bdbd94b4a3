

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{EnumString, IntoStaticStr};
use uuid::Uuid;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    CacheHit,
    CacheMiss,
    ExpansionDegraded,
    FallbackChosen,
    StageLatency,
    QueryFailed,
    SanitizerRedacted,
}


#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventMetadata {
    pub correlation_id: Option<Uuid>,

    pub fingerprint: Option<String>,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,

    pub event_type: EventType,

    pub timestamp: DateTime<Utc>,

    pub metadata: EventMetadata,

    pub payload: Value,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            metadata: EventMetadata::default(),
            payload,
        }
    }

    #[must_use]
    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.metadata.correlation_id = Some(correlation_id);
        self
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.metadata.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn stage_latency(stage: &str, latency_ms: u64) -> Self {
        Self::new(
            EventType::StageLatency,
            serde_json::json!({ "stage": stage, "latency_ms": latency_ms }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let name: &'static str = EventType::FallbackChosen.into();
        assert_eq!(name, "fallback_chosen");
        assert_eq!("cache_hit".parse::<EventType>().unwrap(), EventType::CacheHit);
    }

    #[test]
    fn test_event_builders() {
        let id = Uuid::new_v4();
        let event = Event::stage_latency("expand", 42)
            .with_correlation(id)
            .with_fingerprint("abc");
        assert_eq!(event.event_type, EventType::StageLatency);
        assert_eq!(event.metadata.correlation_id, Some(id));
        assert_eq!(event.payload["latency_ms"], 42);
    }
}
