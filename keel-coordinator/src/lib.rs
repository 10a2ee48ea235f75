//! Entity lifecycle coordinator for the keel entity core.
//!
//! Each entity lives in four independent backends:
//! - a persistent **state store** holding the canonical snapshot
//! - a live **runtime** executing the entity's state machine
//! - a coordination **registry** holding mapper and subscription rules
//! - a **search index** holding a searchable projection
//!
//! There is no transaction spanning them. The [`EntityCoordinator`] sequences
//! calls to these collaborators for every operation and reports the first
//! failing step; it never compensates for steps that already succeeded.
//!
//! # Pipelines
//!
//! | Operation | Steps (in order) |
//! |---|---|
//! | create | probe state, save state, notify runtime |
//! | delete | runtime teardown, search delete, state delete, registry delete |
//! | set properties / configs / patch | runtime call, reload state |
//! | append / remove mapper | probe state, registry writes, runtime call, reload state |
//!
//! # Example
//!
//! ```
//! use keel_coordinator::{CoordinatorConfig, EntityCoordinator};
//! use keel_coordinator::mock::MockBackends;
//! use keel_types::Base;
//!
//! # tokio_test::block_on(async {
//! let backends = MockBackends::new();
//! let coordinator = EntityCoordinator::new(CoordinatorConfig::default(), backends.collaborators());
//!
//! let created = coordinator.create_entity(Base::new("", "device")).await.unwrap();
//! let stored = coordinator.get_properties(&created.id).await.unwrap();
//! assert_eq!(stored, created);
//! # });
//! ```

mod backend;
mod config;
mod coordinator;
mod error;
mod locks;
mod message;
pub mod mock;

pub use backend::{Collaborators, Runtime, SearchIndex, StateStore, Registry};
pub use config::{CoordinatorConfig, ENTITY_STATE_NAME, SUBSCRIPTION_PREFIX, TQL_PREFIX};
pub use coordinator::EntityCoordinator;
pub use error::{BackendError, BackendResult, CoordinatorError, CoordinatorResult, Step};
pub use locks::{EntityGuard, EntityLocks};
pub use message::{MessagePayload, RuntimeMessage, OPERATOR_REPLACE};
