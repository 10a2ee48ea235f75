use keel_coordinator::mock::{MockBackends, RegistryOp, RuntimeOp};
use keel_coordinator::{CoordinatorConfig, EntityCoordinator, Step};
use keel_types::{Base, EntityId, Mapper};
use pretty_assertions::assert_eq;

fn make_coordinator() -> (EntityCoordinator, MockBackends) {
    let backends = MockBackends::new();
    let coordinator = EntityCoordinator::new(CoordinatorConfig::default(), backends.collaborators());
    (coordinator, backends)
}

async fn make_seeded() -> (EntityCoordinator, MockBackends) {
    let (coordinator, backends) = make_coordinator();
    coordinator
        .create_entity(Base::new("dev-1", "device"))
        .await
        .unwrap();
    (coordinator, backends)
}

fn mappers(list: &[(&str, &str)]) -> Base {
    list.iter().fold(Base::new("dev-1", "device"), |base, (name, tql)| {
        base.with_mapper(Mapper::new(*name, *tql))
    })
}

// ── Append ───────────────────────────────────────────────────────

#[tokio::test]
async fn append_writes_registry_and_runtime() {
    let (coordinator, backends) = make_seeded().await;

    let refreshed = coordinator
        .append_mapper(&mappers(&[("m1", "select a"), ("m2", "select b")]))
        .await
        .unwrap();

    assert_eq!(backends.registry.get("core.tql.dev-1m1").as_deref(), Some("select a"));
    assert_eq!(backends.registry.get("core.tql.dev-1m2").as_deref(), Some("select b"));
    assert_eq!(backends.runtime.calls(), vec![RuntimeOp::AppendMapper]);
    assert_eq!(
        refreshed.mappers,
        vec![Mapper::new("m1", "select a"), Mapper::new("m2", "select b")]
    );
}

#[tokio::test]
async fn append_same_name_replaces_rule() {
    let (coordinator, backends) = make_seeded().await;

    coordinator.append_mapper(&mappers(&[("m1", "select a")])).await.unwrap();
    let refreshed = coordinator
        .append_mapper(&mappers(&[("m1", "select z")]))
        .await
        .unwrap();

    assert_eq!(refreshed.mappers, vec![Mapper::new("m1", "select z")]);
    assert_eq!(backends.registry.get("core.tql.dev-1m1").as_deref(), Some("select z"));
    assert_eq!(backends.registry.len(), 1);
}

#[tokio::test]
async fn append_to_missing_entity_is_not_found() {
    let (coordinator, backends) = make_coordinator();

    let err = coordinator
        .append_mapper(&mappers(&[("m1", "select a")]))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(backends.registry.is_empty());
    assert!(backends.runtime.calls().is_empty());
}

#[tokio::test]
async fn second_registry_write_failure_keeps_first_and_skips_runtime() {
    let (coordinator, backends) = make_seeded().await;
    backends
        .registry
        .fail_on(RegistryOp::PutKey("core.tql.dev-1m2".to_string()));

    let err = coordinator
        .append_mapper(&mappers(&[("m1", "select a"), ("m2", "select b")]))
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some(Step::RegistryPut));
    assert_eq!(backends.registry.get("core.tql.dev-1m1").as_deref(), Some("select a"));
    assert!(backends.registry.get("core.tql.dev-1m2").is_none());
    assert!(backends.runtime.calls().is_empty());
}

#[tokio::test]
async fn append_runtime_failure_leaves_registry_written() {
    let (coordinator, backends) = make_seeded().await;
    backends.runtime.fail_on(RuntimeOp::AppendMapper);

    let err = coordinator
        .append_mapper(&mappers(&[("m1", "select a")]))
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some(Step::RuntimeAppendMapper));
    assert!(backends.registry.get("core.tql.dev-1m1").is_some());
    let stored = backends.state.snapshot(&EntityId::new("dev-1")).unwrap();
    assert!(stored.mappers.is_empty());
}

// ── Remove ───────────────────────────────────────────────────────

#[tokio::test]
async fn remove_deletes_registry_and_runtime_mapper() {
    let (coordinator, backends) = make_seeded().await;
    coordinator
        .append_mapper(&mappers(&[("m1", "select a"), ("m2", "select b")]))
        .await
        .unwrap();

    let refreshed = coordinator
        .remove_mapper(&mappers(&[("m1", "")]))
        .await
        .unwrap();

    assert_eq!(refreshed.mappers, vec![Mapper::new("m2", "select b")]);
    assert!(backends.registry.get("core.tql.dev-1m1").is_none());
    assert!(backends.registry.get("core.tql.dev-1m2").is_some());
    assert_eq!(
        backends.runtime.calls(),
        vec![RuntimeOp::AppendMapper, RuntimeOp::RemoveMapper]
    );
}

#[tokio::test]
async fn remove_from_missing_entity_is_not_found() {
    let (coordinator, backends) = make_coordinator();
    backends.registry.insert("core.tql.dev-1m1", "select a");

    let err = coordinator
        .remove_mapper(&mappers(&[("m1", "")]))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(backends.registry.get("core.tql.dev-1m1").is_some());
}

#[tokio::test]
async fn remove_registry_failure_names_step() {
    let (coordinator, backends) = make_seeded().await;
    coordinator.append_mapper(&mappers(&[("m1", "select a")])).await.unwrap();
    backends.registry.fail_on(RegistryOp::Delete);

    let err = coordinator
        .remove_mapper(&mappers(&[("m1", "")]))
        .await
        .unwrap_err();

    assert_eq!(err.step(), Some(Step::RegistryRemove));
    assert_eq!(backends.runtime.calls(), vec![RuntimeOp::AppendMapper]);
}
