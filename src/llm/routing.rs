use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};


#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelTier {
    #[default]
    LowCost,
    HighCapability,
}


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutingSignals {
    pub redaction_count: usize,
    pub entity_count: usize,
    /// Rule-table hits known before the model call. Logged with the decision;
    /// never moves a query off the high-capability tier.
    pub merged_term_count: usize,
}


/// Pure decision from query signals to a model tier: any redaction, or more
/// than `entity_threshold` entities, routes to the high-capability tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub entity_threshold: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self { entity_threshold: 3 }
    }
}

impl RoutingPolicy {
    pub fn new(entity_threshold: usize) -> Self {
        Self { entity_threshold }
    }

    #[must_use]
    pub fn route(&self, signals: RoutingSignals) -> ModelTier {
        if signals.redaction_count > 0 || signals.entity_count > self.entity_threshold {
            ModelTier::HighCapability
        } else {
            ModelTier::LowCost
        }
    }
}
