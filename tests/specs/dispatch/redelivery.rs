//! At-least-once dispatch specs

use crate::prelude::*;
use nx_core::error::DISPATCH_EXHAUSTED;
use similar_asserts::assert_eq;

#[tokio::test]
async fn expired_lease_is_redelivered() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let first = world.lease(None).await;
    world.clock.advance(Duration::from_secs(6));
    world.nexus().tick().await;
    let second = world.lease(None).await;

    assert_eq!(second.task.id, first.task.id);
    assert_eq!(first.attempt, 1);
    assert_eq!(second.attempt, 2);

    // The expired lease can no longer answer
    let late = world
        .nexus()
        .respond_task(
            &first.lease_id,
            TaskResponse::Accepted {
                token: "late".into(),
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(late, NexusError::NotFound(_)));
}

#[tokio::test]
async fn nacked_task_comes_back() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let first = world.lease(None).await;
    world
        .nexus()
        .nack_task(&first.lease_id, "worker restarting")
        .await
        .unwrap();

    let second = world.lease(None).await;
    assert_eq!(second.task.id, first.task.id);
    assert_eq!(second.attempt, 2);
}

#[tokio::test]
async fn exhausted_dispatch_fails_the_operation() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    for _ in 0..3 {
        world.lease(None).await;
        world.clock.advance(Duration::from_secs(6));
        world.nexus().tick().await;
    }

    let result = world
        .nexus()
        .get_result(&charge_key("order-1"), None)
        .await
        .unwrap();
    let OperationResult::Failed { failure } = result else {
        panic!("expected failure, got {result:?}");
    };
    assert_eq!(failure.code, DISPATCH_EXHAUSTED);
    assert_eq!(world.notify.calls_for("dispatch").len(), 1);
    assert!(world.idle(None).await);
}

#[tokio::test]
async fn acked_task_is_not_redelivered() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();
    let start = world.lease(None).await;
    world.accept(&start).await;

    world.clock.advance(Duration::from_secs(60));
    world.nexus().tick().await;

    assert!(world.idle(None).await);
    assert_eq!(world.state("order-1").await, OperationState::Started);
}

#[tokio::test]
async fn restart_redispatches_open_work() {
    let dir = tempfile::tempdir().unwrap();
    {
        let world = World::with_store(Arc::new(Store::open(dir.path()).unwrap())).await;
        world.nexus().start(charge("order-1", "r1")).await.unwrap();
        world.nexus().start(charge("order-2", "r2")).await.unwrap();
        let start = world.lease(None).await;
        world.accept(&start).await;
        world.shutdown().await;
    }

    let world = World::with_store(Arc::new(Store::open(dir.path()).unwrap())).await;
    assert_eq!(world.nexus().status().operations, 2);

    let lease = world.lease(None).await;
    assert_eq!(lease.task.operation, charge_key("order-2"));
    assert_eq!(lease.attempt, 1);
    assert!(world.idle(None).await);

    // The dedup ledger survived too
    let retry = world.nexus().start(charge("order-1", "r1")).await.unwrap();
    assert_eq!(retry, accepted("order-1"));
}
