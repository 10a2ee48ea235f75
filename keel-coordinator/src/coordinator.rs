//! The entity coordinator.
//!
//! Every multi-store operation is an ordered pipeline of independently
//! failing collaborator calls. A failing step aborts the pipeline and is
//! reported; steps that already succeeded are left in place, and callers
//! reconcile from the step named in the error.

use crate::backend::{Collaborators, Registry, Runtime, SearchIndex, StateStore};
use crate::config::CoordinatorConfig;
use crate::error::{BackendError, CoordinatorError, CoordinatorResult, Step, StepExt};
use crate::locks::{EntityGuard, EntityLocks};
use crate::message::{OPERATOR_REPLACE, RuntimeMessage};
use keel_types::{Base, EntityId, PatchData, decode_base, encode_base};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Sequences entity operations across the state store, runtime, registry
/// and search index.
///
/// Cheap to share: wrap it in an `Arc` and call it from any number of tasks.
/// Dropping an operation's future cancels the collaborator call in flight and
/// starts no further step.
pub struct EntityCoordinator {
    config: CoordinatorConfig,
    state: Arc<dyn StateStore>,
    registry: Arc<dyn Registry>,
    search: Arc<dyn SearchIndex>,
    runtime: Arc<dyn Runtime>,
    locks: EntityLocks,
}

impl EntityCoordinator {
    pub fn new(config: CoordinatorConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            state: collaborators.state,
            registry: collaborators.registry,
            search: collaborators.search,
            runtime: collaborators.runtime,
            locks: EntityLocks::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Starts the runtime.
    pub async fn start(&self) -> CoordinatorResult<()> {
        self.runtime
            .start()
            .await
            .at(Step::StartRuntime)
            .inspect_err(|e| error!(error = %e, "start entity coordinator"))
    }

    /// Forwards an inbound message to the runtime unchanged.
    pub fn on_message(&self, message: RuntimeMessage) {
        self.runtime.send(message);
    }

    // ── Create / delete ──────────────────────────────────────────

    /// Creates an entity, assigning a fresh id when `base.id` is empty.
    ///
    /// The runtime is notified but not awaited, so the entity may not be live
    /// yet when this returns.
    pub async fn create_entity(&self, mut base: Base) -> CoordinatorResult<Base> {
        if base.id.is_empty() {
            base.id = EntityId::generate()
                .map_err(CoordinatorError::from)
                .inspect_err(|e| error!(error = %e, "create entity"))?;
        }

        let id = base.id.clone();
        let _guard = self.guard(&id).await;
        self.create_pipeline(base)
            .await
            .inspect_err(|e| error!(entity_id = %id, error = %e, "create entity"))
    }

    async fn create_pipeline(&self, base: Base) -> CoordinatorResult<Base> {
        if self.read_raw(&base.id, Step::ProbeState).await?.is_some() {
            return Err(CoordinatorError::AlreadyExists(base.id));
        }

        let bytes = encode_base(&base)?;
        self.state
            .save(&self.config.state_store, base.id.as_str(), bytes)
            .await
            .at(Step::SaveState)?;
        debug!(entity_id = %base.id, "entity saved, notifying runtime");

        self.runtime
            .send(RuntimeMessage::property(base.id.clone(), OPERATOR_REPLACE));
        Ok(base)
    }

    /// Deletes an entity from the runtime, search index, state store and
    /// registry, in that order, and returns the runtime's last snapshot.
    ///
    /// Not transactional: on failure the stores processed before the failing
    /// step no longer hold the entity while the later ones still do.
    pub async fn delete_entity(&self, en: &Base) -> CoordinatorResult<Base> {
        let id = Self::require_id(en, "delete entity")?;
        let _guard = self.guard(id).await;
        let base = self
            .delete_pipeline(en)
            .await
            .inspect_err(|e| error!(entity_id = %id, error = %e, "delete entity"))?;

        info!(entity_id = %id, entity_type = %base.entity_type, mappers = base.mappers.len(), "delete entity");
        Ok(base)
    }

    async fn delete_pipeline(&self, en: &Base) -> CoordinatorResult<Base> {
        let base = self.runtime.tear_down(en).await.at(Step::RuntimeTearDown)?;

        self.search
            .delete_by_id(&en.id)
            .await
            .at(Step::SearchDelete)?;

        self.state
            .delete(&self.config.state_store, en.id.as_str())
            .await
            .at(Step::StateDelete)?;

        let entity_type = if en.entity_type.is_empty() {
            &base.entity_type
        } else {
            &en.entity_type
        };
        let prefix = self.config.subscription_key_prefix(entity_type, &en.id);
        self.registry
            .delete_prefix(&prefix)
            .await
            .at(Step::RegistryDelete)?;
        for mapper in &base.mappers {
            let key = self.config.mapper_key(&en.id, &mapper.name);
            self.registry.delete(&key).await.at(Step::RegistryDelete)?;
        }

        Ok(base)
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Reads the stored snapshot of `id`.
    pub async fn get_properties(&self, id: &EntityId) -> CoordinatorResult<Base> {
        self.load(id)
            .await
            .inspect_err(|e| error!(entity_id = %id, error = %e, "get properties"))
    }

    async fn load(&self, id: &EntityId) -> CoordinatorResult<Base> {
        match self.read_raw(id, Step::LoadState).await? {
            Some(bytes) => Ok(decode_base(&bytes)?),
            None => Err(CoordinatorError::NotFound(id.clone())),
        }
    }

    /// Raw snapshot bytes, with every flavour of "absent" folded into `None`.
    async fn read_raw(&self, id: &EntityId, step: Step) -> CoordinatorResult<Option<Vec<u8>>> {
        match self.state.get(&self.config.state_store, id.as_str()).await {
            Ok(Some(bytes)) if !bytes.is_empty() => Ok(Some(bytes)),
            Ok(_) | Err(BackendError::NotFound(_)) => Ok(None),
            Err(source) => Err(CoordinatorError::Collaborator { step, source }),
        }
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Replaces properties through the runtime and returns the stored
    /// snapshot afterwards.
    pub async fn set_properties(&self, en: &Base) -> CoordinatorResult<Base> {
        let id = Self::require_id(en, "set entity properties")?;
        let _guard = self.guard(id).await;
        let result = match self.runtime.set_properties(en).await.at(Step::RuntimeSetProperties) {
            Ok(()) => self.load(id).await,
            Err(e) => Err(e),
        };
        result.inspect_err(|e| error!(entity_id = %id, error = %e, "set entity properties"))
    }

    /// Replaces configs through the runtime and returns the stored snapshot
    /// afterwards.
    pub async fn set_configs(&self, en: &Base) -> CoordinatorResult<Base> {
        let id = Self::require_id(en, "set entity configs")?;
        let _guard = self.guard(id).await;
        let result = match self.runtime.set_configs(en).await.at(Step::RuntimeSetConfigs) {
            Ok(()) => self.load(id).await,
            Err(e) => Err(e),
        };
        result.inspect_err(|e| error!(entity_id = %id, error = %e, "set entity configs"))
    }

    /// Applies patch operations through the runtime and returns the stored
    /// snapshot afterwards. Ordering and conflict rules are the runtime's.
    pub async fn patch_entity(&self, en: &Base, patches: &[PatchData]) -> CoordinatorResult<Base> {
        let id = Self::require_id(en, "patch entity")?;
        let _guard = self.guard(id).await;
        let result = match self.runtime.patch_entity(en, patches).await.at(Step::RuntimePatch) {
            Ok(()) => self.load(id).await,
            Err(e) => Err(e),
        };
        result.inspect_err(|e| error!(entity_id = %id, error = %e, patches = patches.len(), "patch entity"))
    }

    // ── Mappers ──────────────────────────────────────────────────

    /// Writes every mapper of `en` to the registry, then hands them to the
    /// runtime.
    ///
    /// A registry failure part-way leaves the earlier mappers written and the
    /// runtime untouched.
    pub async fn append_mapper(&self, en: &Base) -> CoordinatorResult<Base> {
        let id = Self::require_id(en, "append mapper")?;
        let _guard = self.guard(id).await;
        self.append_pipeline(en)
            .await
            .inspect_err(|e| error!(entity_id = %id, error = %e, "append mapper"))
    }

    async fn append_pipeline(&self, en: &Base) -> CoordinatorResult<Base> {
        self.ensure_exists(&en.id).await?;

        for mapper in &en.mappers {
            let key = self.config.mapper_key(&en.id, &mapper.name);
            self.registry
                .put(&key, &mapper.tql)
                .await
                .at(Step::RegistryPut)?;
            info!(entity_id = %en.id, mapper = %mapper.name, "append mapper");
        }

        self.runtime
            .append_mapper(en)
            .await
            .at(Step::RuntimeAppendMapper)?;
        self.load(&en.id).await
    }

    /// Deletes every mapper of `en` (by name) from the registry, then from
    /// the runtime.
    pub async fn remove_mapper(&self, en: &Base) -> CoordinatorResult<Base> {
        let id = Self::require_id(en, "remove mapper")?;
        let _guard = self.guard(id).await;
        self.remove_pipeline(en)
            .await
            .inspect_err(|e| error!(entity_id = %id, error = %e, "remove mapper"))
    }

    async fn remove_pipeline(&self, en: &Base) -> CoordinatorResult<Base> {
        self.ensure_exists(&en.id).await?;

        for mapper in &en.mappers {
            let key = self.config.mapper_key(&en.id, &mapper.name);
            self.registry
                .delete(&key)
                .await
                .at(Step::RegistryRemove)?;
            info!(entity_id = %en.id, mapper = %mapper.name, "remove mapper");
        }

        self.runtime
            .remove_mapper(en)
            .await
            .at(Step::RuntimeRemoveMapper)?;
        self.load(&en.id).await
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn ensure_exists(&self, id: &EntityId) -> CoordinatorResult<()> {
        match self.read_raw(id, Step::ProbeState).await? {
            Some(_) => Ok(()),
            None => Err(CoordinatorError::NotFound(id.clone())),
        }
    }

    async fn guard(&self, id: &EntityId) -> Option<EntityGuard<'_>> {
        if self.config.serialize_per_entity {
            Some(self.locks.lock(id).await)
        } else {
            None
        }
    }

    fn require_id<'a>(en: &'a Base, operation: &'static str) -> CoordinatorResult<&'a EntityId> {
        if en.id.is_empty() {
            error!("{operation}: missing entity id");
            return Err(CoordinatorError::MissingId(operation));
        }
        Ok(&en.id)
    }
}
