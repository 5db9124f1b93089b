//! Idempotent start specs
//!
//! A request id names at most one operation; retries join it.

use crate::prelude::*;
use similar_asserts::assert_eq;

#[tokio::test]
async fn retried_start_joins_the_first_operation() {
    let world = World::new().await;

    let first = world.nexus().start(charge("order-1", "r1")).await.unwrap();
    let retry = world.nexus().start(charge("order-1", "r1")).await.unwrap();

    assert_eq!(first, accepted("order-1"));
    assert_eq!(retry, accepted("order-1"));
    let status = world.nexus().status();
    assert_eq!(status.operations, 1);
    assert_eq!(status.queues.pending, 1);
}

#[tokio::test]
async fn retry_under_a_new_operation_id_returns_the_original() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let retry = world.nexus().start(charge("order-2", "r1")).await.unwrap();

    assert_eq!(retry, accepted("order-1"));
    let missing = world.nexus().get_info(&charge_key("order-2")).await;
    assert!(matches!(missing, Err(NexusError::NotFound(_))));
}

#[tokio::test]
async fn operation_id_reused_by_another_request_is_rejected() {
    let world = World::new().await;
    world.nexus().start(charge("order-1", "r1")).await.unwrap();

    let err = world
        .nexus()
        .start(charge("order-1", "r2"))
        .await
        .unwrap_err();
    assert!(matches!(err, NexusError::AlreadyExists { .. }), "{err}");
}

#[tokio::test]
async fn concurrent_starts_create_one_operation() {
    let world = World::new().await;

    let starts: Vec<_> = (0..8)
        .map(|_| {
            let nexus = Arc::clone(world.nexus());
            tokio::spawn(async move { nexus.start(charge("order-1", "r1")).await })
        })
        .collect();
    for start in starts {
        assert_eq!(start.await.unwrap().unwrap(), accepted("order-1"));
    }

    assert_eq!(world.nexus().status().operations, 1);
    let lease = world.lease(None).await;
    assert_eq!(lease.task.operation, charge_key("order-1"));
    assert!(world.idle(None).await);
}

#[tokio::test]
async fn retried_sync_start_replays_the_inline_result() {
    let world = World::new().await;
    let quote = || {
        StartRequest::new("orders", "quote", "q-1", Payload::new(b"{}".to_vec()))
            .with_request_id("rq")
    };

    let start = {
        let nexus = Arc::clone(world.nexus());
        let request = quote();
        tokio::spawn(async move { nexus.start(request).await })
    };
    let lease = world.lease(None).await;
    let outcome = Outcome::Succeeded {
        result: Payload::new(b"12.50".to_vec()),
    };
    world
        .respond(
            &lease,
            TaskResponse::Completed {
                outcome: outcome.clone(),
            },
        )
        .await;

    let expected = StartResponse::Inline { outcome };
    assert_eq!(start.await.unwrap().unwrap(), expected);
    assert_eq!(world.nexus().start(quote()).await.unwrap(), expected);
    assert!(world.idle(None).await);
}

#[tokio::test]
async fn missing_request_id_is_derived_from_the_operation() {
    let world = World::new().await;
    let request =
        || StartRequest::new("orders", "charge", "order-9", Payload::default()).without_request_id();

    let first = world.nexus().start(request()).await.unwrap();
    let retry = world.nexus().start(request()).await.unwrap();

    assert_eq!(first, accepted("order-9"));
    assert_eq!(retry, accepted("order-9"));
    let info = world.nexus().get_info(&charge_key("order-9")).await.unwrap();
    assert_eq!(
        info.request_id,
        RequestId::derive("orders", "charge", "order-9")
    );
    assert!(info.request_id.as_str().starts_with("derived-"));
    assert_eq!(world.nexus().status().operations, 1);
}

#[tokio::test]
async fn fire_and_forget_returns_without_waiting() {
    let world = World::new().await;
    let request = StartRequest::new("orders", "notify", "n-1", Payload::default());

    let response = tokio::time::timeout(Duration::from_millis(250), world.nexus().start(request))
        .await
        .expect("fire-and-forget start should not wait for the handler")
        .unwrap();

    assert_eq!(
        response,
        StartResponse::AsyncAccepted {
            operation_id: "n-1".into()
        }
    );
}
