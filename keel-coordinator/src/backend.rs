//! Collaborator abstractions.
//!
//! The coordinator talks to four independent services through these traits,
//! so any client (remote or in-memory) can back it. Retry and timeout policy
//! belong to the implementations, not to the coordinator.

use crate::error::BackendResult;
use crate::message::RuntimeMessage;
use async_trait::async_trait;
use keel_types::{Base, EntityId, PatchData};
use std::sync::Arc;

/// Durable key/blob storage for entity snapshots.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Saves `value` under `key` in the `store` namespace.
    async fn save(&self, store: &str, key: &str, value: Vec<u8>) -> BackendResult<()>;

    /// Reads the value under `key`. A missing key is `Ok(None)`, never an
    /// empty success.
    async fn get(&self, store: &str, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Deletes the value under `key`.
    async fn delete(&self, store: &str, key: &str) -> BackendResult<()>;
}

/// Distributed key/value registry for mapper and subscription rules.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> BackendResult<()>;

    async fn delete(&self, key: &str) -> BackendResult<()>;

    /// Deletes every key starting with `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> BackendResult<()>;
}

/// Searchable projection of entities.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Removes the projection of `id`. Deleting an unknown id succeeds.
    async fn delete_by_id(&self, id: &EntityId) -> BackendResult<()>;
}

/// The live state-machine runtime.
///
/// Synchronous calls return once the live state machine has applied the
/// change. The coordinator never inspects runtime-internal state.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Queues a message without waiting for delivery.
    fn send(&self, message: RuntimeMessage);

    async fn start(&self) -> BackendResult<()>;

    async fn set_properties(&self, base: &Base) -> BackendResult<()>;

    async fn set_configs(&self, base: &Base) -> BackendResult<()>;

    /// Applies `patches` in order against the live state.
    async fn patch_entity(&self, base: &Base, patches: &[PatchData]) -> BackendResult<()>;

    async fn append_mapper(&self, base: &Base) -> BackendResult<()>;

    async fn remove_mapper(&self, base: &Base) -> BackendResult<()>;

    /// Stops the live state machine and returns its last known snapshot.
    async fn tear_down(&self, base: &Base) -> BackendResult<Base>;
}

/// Long-lived client handles shared by every coordinator invocation.
#[derive(Clone)]
pub struct Collaborators {
    pub state: Arc<dyn StateStore>,
    pub registry: Arc<dyn Registry>,
    pub search: Arc<dyn SearchIndex>,
    pub runtime: Arc<dyn Runtime>,
}
