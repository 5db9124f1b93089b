//! Cancellation specs

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn cancel_before_start_cancels_the_later_start() {
    let world = World::new().await;

    let marked = world
        .nexus()
        .cancel_by_request("orders", "charge", &RequestId::from("r9"))
        .await
        .unwrap();
    assert_eq!(
        marked,
        CancelOutcome::Marked {
            request_id: RequestId::from("r9")
        }
    );

    let err = world
        .nexus()
        .start(charge("order-9", "r9"))
        .await
        .unwrap_err();
    assert!(matches!(err, NexusError::CanceledBeforeStarted(_)), "{err}");
    assert_eq!(world.state("order-9").await, OperationState::Canceled);
    assert!(world.idle(None).await, "canceled start must never dispatch");
}

#[tokio::test]
async fn cancel_marker_is_consumed_once() {
    let world = World::new().await;
    world
        .nexus()
        .cancel_by_request("orders", "charge", &RequestId::from("r9"))
        .await
        .unwrap();
    let _ = world.nexus().start(charge("order-9", "r9")).await;

    // A fresh request is unaffected by the consumed marker
    let response = world.nexus().start(charge("order-10", "r10")).await.unwrap();
    assert_eq!(response, accepted("order-10"));
}

#[tokio::test]
async fn cancel_of_queued_start_withdraws_it() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let info = world.nexus().cancel(&charge_key("order-1")).await.unwrap();

    assert_eq!(info.state, OperationState::Canceled);
    assert!(world.idle(None).await);
    assert_eq!(
        world
            .nexus()
            .get_result(&charge_key("order-1"), None)
            .await
            .unwrap(),
        OperationResult::Canceled
    );
}

#[tokio::test]
async fn cancel_of_started_operation_reaches_the_handler() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();
    let start = world.lease(None).await;
    world.accept(&start).await;
    assert_eq!(world.state("order-1").await, OperationState::Started);

    let info = world.nexus().cancel(&charge_key("order-1")).await.unwrap();
    assert!(info.cancel_requested);
    assert_eq!(info.state, OperationState::Started);

    let cancel = world.lease(None).await;
    match &cancel.task.kind {
        TaskKind::Cancel { token } => assert_eq!(token, "tok-order-1"),
        other => panic!("expected a cancel task, got {other:?}"),
    }
    world.respond(&cancel, TaskResponse::CancelConfirmed).await;

    assert_eq!(world.state("order-1").await, OperationState::Canceled);
}

#[tokio::test]
async fn acknowledged_cancel_lets_the_operation_finish() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();
    let start = world.lease(None).await;
    world.accept(&start).await;

    world.nexus().cancel(&charge_key("order-1")).await.unwrap();
    let cancel = world.lease(None).await;
    world.respond(&cancel, TaskResponse::CancelAcknowledged).await;
    assert_eq!(world.state("order-1").await, OperationState::Started);

    world
        .nexus()
        .complete(
            &charge_key("order-1"),
            Outcome::Succeeded {
                result: Payload::new(b"partial".to_vec()),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(world.state("order-1").await, OperationState::Succeeded);
}

#[tokio::test]
async fn cancel_of_finished_operation_changes_nothing() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();
    let start = world.lease(None).await;
    world.accept(&start).await;
    world
        .nexus()
        .complete(
            &charge_key("order-1"),
            Outcome::Succeeded {
                result: Payload::default(),
            },
            None,
        )
        .await
        .unwrap();

    let info = world.nexus().cancel(&charge_key("order-1")).await.unwrap();

    assert_eq!(info.state, OperationState::Succeeded);
    assert!(!info.cancel_requested);
}

#[tokio::test]
async fn cancel_by_request_after_start_cancels_the_operation() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let outcome = world
        .nexus()
        .cancel_by_request("orders", "charge", &RequestId::from("r1"))
        .await
        .unwrap();

    match outcome {
        CancelOutcome::Operation { info } => {
            assert_eq!(info.operation_id, "order-1");
            assert_eq!(info.state, OperationState::Canceled);
        }
        other => panic!("expected the operation, got {other:?}"),
    }
}
