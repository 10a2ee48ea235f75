//! Per-entity mutual exclusion.
//!
//! Mutating pipelines hold the lock of their entity id from first to last
//! step, so a create and a delete of the same id never interleave. Different
//! ids never contend.

use keel_types::EntityId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Table of async locks keyed by entity id. Entries exist only while held or
/// awaited.
#[derive(Debug, Default)]
pub struct EntityLocks {
    slots: Mutex<HashMap<EntityId, Slot>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`.
    pub async fn lock(&self, id: &EntityId) -> EntityGuard<'_> {
        let slot = self.slots().entry(id.clone()).or_default().clone();
        let guard = slot.lock_owned().await;
        EntityGuard {
            locks: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of ids currently locked or awaited.
    pub fn active(&self) -> usize {
        self.slots().len()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<EntityId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, id: &EntityId) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get(id) {
            // Only the table itself still references the slot.
            if Arc::strong_count(slot) == 1 {
                slots.remove(id);
            }
        }
    }
}

/// Exclusive access to one entity id; released on drop.
#[derive(Debug)]
pub struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    id: EntityId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl EntityGuard<'_> {
    pub fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.id);
    }
}
