//! Coordinator configuration and the key layout shared with other services.

use keel_types::EntityId;
use serde::{Deserialize, Serialize};

/// State store namespace holding entity snapshots.
pub const ENTITY_STATE_NAME: &str = "core-state";

/// Registry key prefix for subscription entries.
pub const SUBSCRIPTION_PREFIX: &str = "core.subsc.";

/// Registry key prefix for mapper rule text.
pub const TQL_PREFIX: &str = "core.tql.";

/// Configuration for the entity coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// State store namespace for snapshots.
    pub state_store: String,
    /// Registry prefix for subscription entries.
    pub subscription_prefix: String,
    /// Registry prefix for mapper rule text.
    pub mapper_prefix: String,
    /// Serialize mutating pipelines per entity id.
    pub serialize_per_entity: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            state_store: ENTITY_STATE_NAME.to_string(),
            subscription_prefix: SUBSCRIPTION_PREFIX.to_string(),
            mapper_prefix: TQL_PREFIX.to_string(),
            serialize_per_entity: true,
        }
    }
}

impl CoordinatorConfig {
    /// Registry key holding the rule text of one mapper.
    pub fn mapper_key(&self, id: &EntityId, name: &str) -> String {
        format!("{}{}{}", self.mapper_prefix, id, name)
    }

    /// Registry prefix covering every subscription entry of one entity.
    pub fn subscription_key_prefix(&self, entity_type: &str, id: &EntityId) -> String {
        format!("{}{}.{}.", self.subscription_prefix, entity_type, id)
    }
}
