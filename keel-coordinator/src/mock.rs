//! In-memory collaborators for tests and local wiring.
//!
//! Each mock can be told to fail specific operations, and the runtime can be
//! told to stall forever, which is how partial-failure and cancellation
//! behaviour is exercised.

use crate::backend::{Collaborators, Registry, Runtime, SearchIndex, StateStore};
use crate::config::{CoordinatorConfig, ENTITY_STATE_NAME};
use crate::error::{BackendError, BackendResult};
use crate::message::{MessagePayload, RuntimeMessage};
use async_trait::async_trait;
use keel_types::{Base, EntityId, PatchData, decode_base, encode_base};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn injected(op: impl std::fmt::Debug) -> BackendError {
    BackendError::Unavailable(format!("injected failure: {op:?}"))
}

// ── State store ──────────────────────────────────────────────────

/// State store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Save,
    Get,
    Delete,
}

/// A `HashMap`-backed state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<(String, String), Vec<u8>>>,
    failing: Mutex<HashSet<StoreOp>>,
    saves: AtomicUsize,
    gets: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `op` fail.
    pub fn fail_on(&self, op: StoreOp) {
        locked(&self.failing).insert(op);
    }

    pub fn clear_failures(&self) {
        locked(&self.failing).clear();
    }

    /// Writes a value directly, bypassing failure injection and counters.
    pub fn insert(&self, store: &str, key: &str, value: Vec<u8>) {
        locked(&self.values).insert((store.to_string(), key.to_string()), value);
    }

    /// Reads a value directly.
    pub fn value(&self, store: &str, key: &str) -> Option<Vec<u8>> {
        locked(&self.values)
            .get(&(store.to_string(), key.to_string()))
            .cloned()
    }

    /// Decodes the snapshot stored for `id` in the default namespace.
    pub fn snapshot(&self, id: &EntityId) -> Option<Base> {
        self.snapshot_in(ENTITY_STATE_NAME, id)
    }

    /// Decodes the snapshot stored for `id` in `store`.
    pub fn snapshot_in(&self, store: &str, id: &EntityId) -> Option<Base> {
        self.value(store, id.as_str())
            .and_then(|bytes| decode_base(&bytes).ok())
    }

    /// Stores `base` in the default namespace.
    pub fn put_snapshot(&self, base: &Base) -> BackendResult<()> {
        self.put_snapshot_in(ENTITY_STATE_NAME, base)
    }

    /// Stores `base` in `store`.
    pub fn put_snapshot_in(&self, store: &str, base: &Base) -> BackendResult<()> {
        let bytes = encode_base(base).map_err(|e| BackendError::Rejected(e.to_string()))?;
        self.insert(store, base.id.as_str(), bytes);
        Ok(())
    }

    pub fn contains(&self, store: &str, key: &str) -> bool {
        self.value(store, key).is_some()
    }

    pub fn len(&self) -> usize {
        locked(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `save` calls that reached the store.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of `get` calls that reached the store.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn check(&self, op: StoreOp) -> BackendResult<()> {
        if locked(&self.failing).contains(&op) {
            return Err(injected(op));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save(&self, store: &str, key: &str, value: Vec<u8>) -> BackendResult<()> {
        self.check(StoreOp::Save)?;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.insert(store, key, value);
        Ok(())
    }

    async fn get(&self, store: &str, key: &str) -> BackendResult<Option<Vec<u8>>> {
        self.check(StoreOp::Get)?;
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.value(store, key))
    }

    async fn delete(&self, store: &str, key: &str) -> BackendResult<()> {
        self.check(StoreOp::Delete)?;
        locked(&self.values).remove(&(store.to_string(), key.to_string()));
        Ok(())
    }
}

// ── Registry ─────────────────────────────────────────────────────

/// Registry operations that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryOp {
    Put,
    /// A put of one specific key.
    PutKey(String),
    Delete,
    DeletePrefix,
}

/// An ordered in-memory registry supporting prefix deletion.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashSet<RegistryOp>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: RegistryOp) {
        locked(&self.failing).insert(op);
    }

    pub fn clear_failures(&self) {
        locked(&self.failing).clear();
    }

    /// Writes an entry directly, bypassing failure injection.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        locked(&self.entries).insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        locked(&self.entries).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        locked(&self.entries).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        locked(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, op: &RegistryOp) -> BackendResult<()> {
        if locked(&self.failing).contains(op) {
            return Err(injected(op));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn put(&self, key: &str, value: &str) -> BackendResult<()> {
        self.check(&RegistryOp::Put)?;
        self.check(&RegistryOp::PutKey(key.to_string()))?;
        self.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        self.check(&RegistryOp::Delete)?;
        locked(&self.entries).remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> BackendResult<()> {
        self.check(&RegistryOp::DeletePrefix)?;
        locked(&self.entries).retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

// ── Search index ─────────────────────────────────────────────────

/// A set of indexed entity ids.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    documents: Mutex<HashSet<EntityId>>,
    failing: Mutex<bool>,
    deletes: AtomicUsize,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *locked(&self.failing) = failing;
    }

    pub fn index(&self, id: EntityId) {
        locked(&self.documents).insert(id);
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        locked(&self.documents).contains(id)
    }

    /// Number of `delete_by_id` calls that reached the index.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn delete_by_id(&self, id: &EntityId) -> BackendResult<()> {
        if *locked(&self.failing) {
            return Err(injected("delete_by_id"));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        locked(&self.documents).remove(id);
        Ok(())
    }
}

// ── Runtime ──────────────────────────────────────────────────────

/// Runtime operations, as recorded and as failure/stall targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    Start,
    SetProperties,
    SetConfigs,
    Patch,
    AppendMapper,
    RemoveMapper,
    TearDown,
}

/// A runtime that applies mutations straight to a [`MemoryStateStore`], the
/// way a real runtime persists the state it owns.
#[derive(Debug)]
pub struct MemoryRuntime {
    store: Arc<MemoryStateStore>,
    namespace: String,
    live: Mutex<HashSet<EntityId>>,
    sent: Mutex<Vec<RuntimeMessage>>,
    calls: Mutex<Vec<RuntimeOp>>,
    failing: Mutex<HashSet<RuntimeOp>>,
    stalling: Mutex<HashSet<RuntimeOp>>,
    started: Mutex<bool>,
}

impl MemoryRuntime {
    /// Runtime persisting into the default `core-state` namespace.
    pub fn new(store: Arc<MemoryStateStore>) -> Self {
        Self::with_namespace(store, ENTITY_STATE_NAME)
    }

    /// Runtime persisting into the `namespace` state store.
    pub fn with_namespace(store: Arc<MemoryStateStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            live: Mutex::default(),
            sent: Mutex::default(),
            calls: Mutex::default(),
            failing: Mutex::default(),
            stalling: Mutex::default(),
            started: Mutex::new(false),
        }
    }

    pub fn fail_on(&self, op: RuntimeOp) {
        locked(&self.failing).insert(op);
    }

    /// Makes `op` never complete.
    pub fn stall_on(&self, op: RuntimeOp) {
        locked(&self.stalling).insert(op);
    }

    pub fn clear_failures(&self) {
        locked(&self.failing).clear();
        locked(&self.stalling).clear();
    }

    /// Messages received through `send`, oldest first.
    pub fn sent(&self) -> Vec<RuntimeMessage> {
        locked(&self.sent).clone()
    }

    /// Synchronous calls received, oldest first.
    pub fn calls(&self) -> Vec<RuntimeOp> {
        locked(&self.calls).clone()
    }

    pub fn is_live(&self, id: &EntityId) -> bool {
        locked(&self.live).contains(id)
    }

    pub fn is_started(&self) -> bool {
        *locked(&self.started)
    }

    async fn enter(&self, op: RuntimeOp) -> BackendResult<()> {
        locked(&self.calls).push(op);
        if locked(&self.failing).contains(&op) {
            return Err(injected(op));
        }
        let stall = locked(&self.stalling).contains(&op);
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    /// Loads the stored snapshot, applies `f` and stores the result.
    fn update(&self, id: &EntityId, f: impl FnOnce(&mut Base)) -> BackendResult<()> {
        let mut base = self
            .store
            .snapshot_in(&self.namespace, id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        f(&mut base);
        self.store.put_snapshot_in(&self.namespace, &base)?;
        locked(&self.live).insert(id.clone());
        Ok(())
    }
}

#[async_trait]
impl Runtime for MemoryRuntime {
    fn send(&self, message: RuntimeMessage) {
        if let MessagePayload::Property { state_id, .. } = &message.payload {
            if self.store.snapshot_in(&self.namespace, state_id).is_some() {
                locked(&self.live).insert(state_id.clone());
            }
        }
        locked(&self.sent).push(message);
    }

    async fn start(&self) -> BackendResult<()> {
        self.enter(RuntimeOp::Start).await?;
        *locked(&self.started) = true;
        Ok(())
    }

    async fn set_properties(&self, base: &Base) -> BackendResult<()> {
        self.enter(RuntimeOp::SetProperties).await?;
        self.update(&base.id, |live| {
            live.properties
                .extend(base.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        })
    }

    async fn set_configs(&self, base: &Base) -> BackendResult<()> {
        self.enter(RuntimeOp::SetConfigs).await?;
        self.update(&base.id, |live| {
            live.configs
                .extend(base.configs.iter().map(|(k, v)| (k.clone(), v.clone())));
        })
    }

    async fn patch_entity(&self, base: &Base, patches: &[PatchData]) -> BackendResult<()> {
        self.enter(RuntimeOp::Patch).await?;
        self.update(&base.id, |live| live.apply_patch(patches))
    }

    async fn append_mapper(&self, base: &Base) -> BackendResult<()> {
        self.enter(RuntimeOp::AppendMapper).await?;
        self.update(&base.id, |live| {
            for mapper in &base.mappers {
                live.upsert_mapper(mapper.clone());
            }
        })
    }

    async fn remove_mapper(&self, base: &Base) -> BackendResult<()> {
        self.enter(RuntimeOp::RemoveMapper).await?;
        self.update(&base.id, |live| {
            for mapper in &base.mappers {
                live.remove_mapper(&mapper.name);
            }
        })
    }

    async fn tear_down(&self, base: &Base) -> BackendResult<Base> {
        self.enter(RuntimeOp::TearDown).await?;
        let snapshot = self
            .store
            .snapshot_in(&self.namespace, &base.id)
            .ok_or_else(|| BackendError::NotFound(base.id.to_string()))?;
        locked(&self.live).remove(&base.id);
        Ok(snapshot)
    }
}

// ── Wiring ───────────────────────────────────────────────────────

/// One of each in-memory collaborator, with the runtime persisting into the
/// shared state store.
#[derive(Debug, Clone)]
pub struct MockBackends {
    pub state: Arc<MemoryStateStore>,
    pub registry: Arc<MemoryRegistry>,
    pub search: Arc<MemorySearchIndex>,
    pub runtime: Arc<MemoryRuntime>,
}

impl MockBackends {
    pub fn new() -> Self {
        Self::with_config(&CoordinatorConfig::default())
    }

    /// Backends whose runtime persists into `config.state_store`.
    pub fn with_config(config: &CoordinatorConfig) -> Self {
        let state = Arc::new(MemoryStateStore::new());
        Self {
            runtime: Arc::new(MemoryRuntime::with_namespace(
                state.clone(),
                config.state_store.clone(),
            )),
            state,
            registry: Arc::new(MemoryRegistry::new()),
            search: Arc::new(MemorySearchIndex::new()),
        }
    }

    /// Handles suitable for [`crate::EntityCoordinator::new`].
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            state: self.state.clone(),
            registry: self.registry.clone(),
            search: self.search.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl Default for MockBackends {
    fn default() -> Self {
        Self::new()
    }
}
