//! Version routing specs
//!
//! New work goes to the default build; work already handled by a build
//! follows that build's compatible successors.

use crate::prelude::*;
use similar_asserts::assert_eq;

async fn set(world: &World, ordering: SetOrdering) -> u64 {
    world.nexus().set_ordering(TQ, &ordering).await.unwrap()
}

#[tokio::test]
async fn new_work_goes_to_the_default_build() {
    let world = World::new().await;
    set(&world, SetOrdering::new("v1")).await;

    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let lease = world.lease(Some("v1")).await;
    assert_eq!(lease.target, DispatchTarget::Build(BuildId::from("v1")));
}

#[tokio::test]
async fn unversioned_pollers_are_served_from_the_default() {
    let world = World::new().await;
    set(&world, SetOrdering::new("v1")).await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let lease = world.lease(None).await;
    assert_eq!(lease.target, DispatchTarget::Build(BuildId::from("v1")));
}

#[tokio::test]
async fn first_default_drains_the_unversioned_backlog() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    set(&world, SetOrdering::new("v1")).await;

    let lease = world.lease(Some("v1")).await;
    assert_eq!(lease.task.operation, charge_key("order-1"));
}

#[tokio::test]
async fn follow_up_work_moves_to_the_compatible_successor() {
    let world = World::new().await;
    set(&world, SetOrdering::new("v1")).await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();
    let start = world.lease(Some("v1")).await;
    world.accept(&start).await;

    set(&world, SetOrdering::new("v2").compatible_with("v1")).await;
    world.nexus().cancel(&charge_key("order-1")).await.unwrap();

    assert!(world.idle(Some("v1")).await, "v1 was superseded");
    let cancel = world.lease(Some("v2")).await;
    assert!(matches!(cancel.task.kind, TaskKind::Cancel { .. }));
}

#[tokio::test]
async fn incompatible_default_keeps_old_work_on_its_build() {
    let world = World::new().await;
    set(&world, SetOrdering::new("v1")).await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();
    let start = world.lease(Some("v1")).await;
    world.accept(&start).await;

    set(&world, SetOrdering::new("v3").make_default()).await;
    world.nexus().start(charge("order-2", "r2")).await.unwrap();
    world.nexus().cancel(&charge_key("order-1")).await.unwrap();

    let fresh = world.lease(Some("v3")).await;
    assert_eq!(fresh.task.operation, charge_key("order-2"));
    let cancel = world.lease(Some("v1")).await;
    assert_eq!(cancel.task.operation, charge_key("order-1"));
}

#[tokio::test]
async fn cycles_are_rejected_without_changing_the_graph() {
    let world = World::new().await;
    set(&world, SetOrdering::new("v1")).await;
    let revision = set(&world, SetOrdering::new("v2").compatible_with("v1")).await;
    let before = world.nexus().get_ordering(TQ, None);

    let err = world
        .nexus()
        .set_ordering(TQ, &SetOrdering::new("v1").compatible_with("v2"))
        .await
        .unwrap_err();

    assert!(matches!(err, NexusError::Cycle { .. }), "{err}");
    let after = world.nexus().get_ordering(TQ, None);
    assert_eq!(after, before);
    assert_eq!(after.revision, revision);
}

#[tokio::test]
async fn ordering_of_an_unknown_queue_is_empty() {
    let world = World::new().await;
    let view = world.nexus().get_ordering("nobody-tq", None);
    assert_eq!(view.revision, 0);
    assert!(view.current_defaults.is_empty());
    assert!(view.compatible_leaves.is_empty());
}
