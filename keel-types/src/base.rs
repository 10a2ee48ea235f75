//! The entity snapshot.
//!
//! `Base` is the unit the coordinator reads, writes and hands to the
//! runtime. Properties and configs are opaque JSON objects.

use crate::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named mapping rule attached to an entity.
///
/// The rule text is interpreted by the runtime; the core only stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapper {
    pub name: String,
    /// Rule expression text.
    pub tql: String,
}

impl Mapper {
    pub fn new(name: impl Into<String>, tql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tql: tql.into(),
        }
    }
}

/// Canonical snapshot of one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub configs: Map<String, Value>,
    #[serde(default)]
    pub mappers: Vec<Mapper>,
}

impl Base {
    /// Creates an empty snapshot with the given identifier and type.
    pub fn new(id: impl Into<EntityId>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    /// Builder-style: sets one property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Builder-style: sets one config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.configs.insert(key.into(), value);
        self
    }

    /// Builder-style: adds or replaces a mapper.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Mapper) -> Self {
        self.upsert_mapper(mapper);
        self
    }

    /// Looks up a mapper by name.
    pub fn mapper(&self, name: &str) -> Option<&Mapper> {
        self.mappers.iter().find(|m| m.name == name)
    }

    /// Adds a mapper, replacing one with the same name in place.
    pub fn upsert_mapper(&mut self, mapper: Mapper) {
        match self.mappers.iter_mut().find(|m| m.name == mapper.name) {
            Some(existing) => *existing = mapper,
            None => self.mappers.push(mapper),
        }
    }

    /// Removes the mapper with the given name. Returns it if present.
    pub fn remove_mapper(&mut self, name: &str) -> Option<Mapper> {
        let pos = self.mappers.iter().position(|m| m.name == name)?;
        Some(self.mappers.remove(pos))
    }

    /// Applies patch operations to `properties` in order.
    ///
    /// Paths are dotted (`metrics.cpu`). `Add` and `Replace` create missing
    /// intermediate objects; `Remove` of a missing path is a no-op.
    pub fn apply_patch(&mut self, patches: &[PatchData]) {
        for patch in patches {
            let segments: Vec<&str> = patch.path.split('.').filter(|s| !s.is_empty()).collect();
            apply_at(&mut self.properties, &segments, patch);
        }
    }
}

fn apply_at(map: &mut Map<String, Value>, segments: &[&str], patch: &PatchData) {
    match segments {
        [] => {}
        [last] => match patch.operator {
            PatchOperator::Add | PatchOperator::Replace => {
                map.insert((*last).to_string(), patch.value.clone());
            }
            PatchOperator::Remove => {
                map.remove(*last);
            }
        },
        [head, rest @ ..] => {
            if patch.operator == PatchOperator::Remove {
                if let Some(Value::Object(child)) = map.get_mut(*head) {
                    apply_at(child, rest, patch);
                }
                return;
            }
            let slot = map
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                apply_at(child, rest, patch);
            }
        }
    }
}

/// Kind of patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperator {
    Add,
    Remove,
    Replace,
}

/// One patch operation against live entity properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchData {
    pub path: String,
    pub operator: PatchOperator,
    #[serde(default)]
    pub value: Value,
}

impl PatchData {
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            operator: PatchOperator::Replace,
            value,
        }
    }

    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            operator: PatchOperator::Add,
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operator: PatchOperator::Remove,
            value: Value::Null,
        }
    }
}
