//! Error types for the coordinator and its collaborators.

use keel_types::EntityId;
use std::fmt;
use thiserror::Error;

/// Result type for collaborator calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a collaborator (state store, registry, search index or
/// runtime).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The service could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The addressed key or entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The client-side deadline elapsed.
    #[error("operation timed out")]
    Timeout,
}

/// A collaborator call site. Every collaborator failure names the step it
/// happened in so operators can reconcile the stores by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ProbeState,
    SaveState,
    LoadState,
    StartRuntime,
    RuntimeTearDown,
    SearchDelete,
    StateDelete,
    RegistryDelete,
    RegistryPut,
    RegistryRemove,
    RuntimeSetProperties,
    RuntimeSetConfigs,
    RuntimePatch,
    RuntimeAppendMapper,
    RuntimeRemoveMapper,
}

impl Step {
    /// Human-readable name used in error messages and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::ProbeState => "probe entity state",
            Self::SaveState => "save entity state",
            Self::LoadState => "load entity state",
            Self::StartRuntime => "start entity runtime",
            Self::RuntimeTearDown => "delete entity from runtime",
            Self::SearchDelete => "delete entity from search index",
            Self::StateDelete => "delete entity from state",
            Self::RegistryDelete => "delete entity rules from registry",
            Self::RegistryPut => "write mapper to registry",
            Self::RegistryRemove => "delete mapper from registry",
            Self::RuntimeSetProperties => "set entity properties",
            Self::RuntimeSetConfigs => "set entity configs",
            Self::RuntimePatch => "patch entity properties",
            Self::RuntimeAppendMapper => "append mapper to runtime",
            Self::RuntimeRemoveMapper => "remove mapper from runtime",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors returned by [`crate::EntityCoordinator`] operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// No snapshot is stored for the entity.
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// A snapshot is already stored under the identifier.
    #[error("entity already exists: {0}")]
    AlreadyExists(EntityId),

    /// The operation needs an entity identifier and none was given.
    #[error("entity id is required to {0}")]
    MissingId(&'static str),

    #[error("encoding entity snapshot failed: {0}")]
    EncodingFailed(#[source] keel_types::Error),

    #[error("decoding entity snapshot failed: {0}")]
    DecodingFailed(#[source] keel_types::Error),

    #[error("generating entity id failed: {0}")]
    IdentifierGenerationFailed(#[source] keel_types::Error),

    /// A collaborator call failed.
    #[error("{step}: {source}")]
    Collaborator {
        step: Step,
        #[source]
        source: BackendError,
    },
}

impl CoordinatorError {
    /// The failing step, for collaborator failures.
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Collaborator { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

impl From<keel_types::Error> for CoordinatorError {
    fn from(err: keel_types::Error) -> Self {
        match err {
            keel_types::Error::Encoding(_) => Self::EncodingFailed(err),
            keel_types::Error::Decoding(_) | keel_types::Error::EmptySnapshot => {
                Self::DecodingFailed(err)
            }
            keel_types::Error::IdentifierGeneration(_) => Self::IdentifierGenerationFailed(err),
        }
    }
}

/// Attaches the call site to a collaborator result.
pub(crate) trait StepExt<T> {
    fn at(self, step: Step) -> CoordinatorResult<T>;
}

impl<T> StepExt<T> for BackendResult<T> {
    fn at(self, step: Step) -> CoordinatorResult<T> {
        self.map_err(|source| CoordinatorError::Collaborator { step, source })
    }
}
