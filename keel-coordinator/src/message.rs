//! Notifications delivered to the runtime without waiting for a reply.

use keel_types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Operator asking the runtime to (re)load an entity from its stored snapshot.
pub const OPERATOR_REPLACE: &str = "replace";

/// A fire-and-forget message for the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeMessage {
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub payload: MessagePayload,
}

/// The body of a runtime message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    /// A property-level change for the state machine named `state_id`.
    Property { state_id: EntityId, operator: String },

    /// Passed through to the runtime untouched.
    Raw { data: serde_json::Value },
}

impl RuntimeMessage {
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            headers: HashMap::new(),
            payload,
        }
    }

    /// Property message with the given operator.
    pub fn property(state_id: EntityId, operator: impl Into<String>) -> Self {
        Self::new(MessagePayload::Property {
            state_id,
            operator: operator.into(),
        })
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// The entity the message targets, if it names one.
    pub fn target(&self) -> Option<&EntityId> {
        match &self.payload {
            MessagePayload::Property { state_id, .. } => Some(state_id),
            MessagePayload::Raw { .. } => None,
        }
    }
}
