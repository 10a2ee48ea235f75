use keel_coordinator::mock::{MockBackends, RegistryOp, RuntimeOp, StoreOp};
use keel_coordinator::{CoordinatorConfig, ENTITY_STATE_NAME, EntityCoordinator, Step};
use keel_types::{Base, EntityId, Mapper};
use pretty_assertions::assert_eq;
use serde_json::json;

const SUBSCRIPTION_KEY: &str = "core.subsc.device.dev-1.sub-a";
const MAPPER_KEY: &str = "core.tql.dev-1m1";

fn make_coordinator() -> (EntityCoordinator, MockBackends) {
    let backends = MockBackends::new();
    let coordinator = EntityCoordinator::new(CoordinatorConfig::default(), backends.collaborators());
    (coordinator, backends)
}

/// Seeds an entity present in all four backends.
async fn seed(coordinator: &EntityCoordinator, backends: &MockBackends) -> Base {
    let base = Base::new("dev-1", "device").with_property("temp", json!(20));
    coordinator.create_entity(base.clone()).await.unwrap();
    let with_mapper = Base::new("dev-1", "device").with_mapper(Mapper::new("m1", "select 1"));
    coordinator.append_mapper(&with_mapper).await.unwrap();
    backends.registry.insert(SUBSCRIPTION_KEY, "sub");
    backends.search.index(base.id.clone());
    base
}

fn target() -> Base {
    Base::new("dev-1", "device")
}

fn assert_untouched_after_search(backends: &MockBackends) {
    assert!(backends.state.contains(ENTITY_STATE_NAME, "dev-1"));
    assert_eq!(backends.registry.get(SUBSCRIPTION_KEY).as_deref(), Some("sub"));
    assert_eq!(backends.registry.get(MAPPER_KEY).as_deref(), Some("select 1"));
}

// ── Full success ─────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_entity_everywhere() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;
    let id = EntityId::new("dev-1");

    let deleted = coordinator.delete_entity(&target()).await.unwrap();

    assert_eq!(deleted.id, id);
    assert_eq!(deleted.properties["temp"], json!(20));
    assert_eq!(deleted.mappers, vec![Mapper::new("m1", "select 1")]);
    assert!(!backends.runtime.is_live(&id));
    assert!(!backends.search.contains(&id));
    assert!(!backends.state.contains(ENTITY_STATE_NAME, "dev-1"));
    assert!(backends.registry.is_empty());
}

#[tokio::test]
async fn delete_leaves_other_entities_rules() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;
    backends.registry.insert("core.subsc.device.dev-10.sub-a", "other");
    backends.registry.insert("core.tql.dev-2m1", "other");

    coordinator.delete_entity(&target()).await.unwrap();

    assert_eq!(
        backends.registry.keys(),
        vec!["core.subsc.device.dev-10.sub-a".to_string(), "core.tql.dev-2m1".to_string()]
    );
}

#[tokio::test]
async fn delete_uses_runtime_type_when_caller_omits_it() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;

    coordinator.delete_entity(&Base::new("dev-1", "")).await.unwrap();

    assert!(backends.registry.get(SUBSCRIPTION_KEY).is_none());
}

// ── Partial failure ──────────────────────────────────────────────

#[tokio::test]
async fn teardown_failure_deletes_nothing() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;
    backends.runtime.fail_on(RuntimeOp::TearDown);

    let err = coordinator.delete_entity(&target()).await.unwrap_err();

    assert_eq!(err.step(), Some(Step::RuntimeTearDown));
    assert_eq!(backends.search.delete_count(), 0);
    assert!(backends.search.contains(&EntityId::new("dev-1")));
    assert_untouched_after_search(&backends);
}

#[tokio::test]
async fn search_failure_stops_before_state_and_registry() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;
    backends.search.set_failing(true);

    let err = coordinator.delete_entity(&target()).await.unwrap_err();

    assert_eq!(err.step(), Some(Step::SearchDelete));
    assert!(err.to_string().contains("search index"));
    assert!(!backends.runtime.is_live(&EntityId::new("dev-1")));
    assert_untouched_after_search(&backends);
}

#[tokio::test]
async fn state_delete_failure_keeps_registry() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;
    backends.state.fail_on(StoreOp::Delete);

    let err = coordinator.delete_entity(&target()).await.unwrap_err();

    assert_eq!(err.step(), Some(Step::StateDelete));
    assert!(!backends.search.contains(&EntityId::new("dev-1")));
    assert_untouched_after_search(&backends);
}

#[tokio::test]
async fn registry_failure_is_reported_after_state_is_gone() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;
    backends.registry.fail_on(RegistryOp::DeletePrefix);

    let err = coordinator.delete_entity(&target()).await.unwrap_err();

    assert_eq!(err.step(), Some(Step::RegistryDelete));
    assert!(!backends.state.contains(ENTITY_STATE_NAME, "dev-1"));
    assert_eq!(backends.registry.len(), 2);
}

#[tokio::test]
async fn mapper_key_delete_failure_is_reported_as_registry_step() {
    let (coordinator, backends) = make_coordinator();
    seed(&coordinator, &backends).await;
    backends.registry.fail_on(RegistryOp::Delete);

    let err = coordinator.delete_entity(&target()).await.unwrap_err();

    assert_eq!(err.step(), Some(Step::RegistryDelete));
    assert!(backends.registry.get(SUBSCRIPTION_KEY).is_none());
    assert!(backends.registry.get(MAPPER_KEY).is_some());
}

// ── Input validation ─────────────────────────────────────────────

#[tokio::test]
async fn delete_without_id_is_rejected() {
    let (coordinator, backends) = make_coordinator();

    let err = coordinator.delete_entity(&Base::new("", "device")).await.unwrap_err();

    assert!(matches!(err, keel_coordinator::CoordinatorError::MissingId(_)));
    assert!(backends.runtime.calls().is_empty());
}

#[tokio::test]
async fn delete_unknown_entity_fails_at_teardown() {
    let (coordinator, backends) = make_coordinator();

    let err = coordinator.delete_entity(&target()).await.unwrap_err();

    assert_eq!(err.step(), Some(Step::RuntimeTearDown));
    assert_eq!(backends.search.delete_count(), 0);
}
