//! Completion callback specs

use crate::prelude::*;
use similar_asserts::assert_eq;

async fn run_to_completion(world: &World, id: &str, callback: Option<CallbackTarget>) {
    let mut request = charge(id, &format!("req-{id}"));
    if let Some(callback) = callback {
        request = request.with_callback(callback);
    }
    world.nexus().start(request).await.unwrap();
    let start = world.lease(None).await;
    world.accept(&start).await;
    world
        .nexus()
        .complete(
            &charge_key(id),
            Outcome::Succeeded {
                result: Payload::new(b"{\"paid\":true}".to_vec()),
            },
            None,
        )
        .await
        .unwrap();
}

fn caller() -> CallbackTarget {
    CallbackTarget::new("https://caller.test/nexus").with_header("X-Caller", "checkout")
}

#[tokio::test]
async fn completion_is_posted_to_the_caller() {
    let world = World::new().await;
    let mut events = world.nexus().subscribe();

    run_to_completion(&world, "order-1", Some(caller())).await;
    let delivered = wait_for(&mut events, |e| matches!(e, Event::CallbackDelivered { .. })).await;

    assert_eq!(
        delivered,
        Event::CallbackDelivered {
            key: charge_key("order-1"),
            attempts: 1,
            status: 200,
        }
    );
    let calls = world.callbacks.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].request.url, "https://caller.test/nexus");
    assert_eq!(calls[0].header("X-Caller"), Some("checkout"));
    let body = calls[0].body_json();
    assert_eq!(body["operation_id"], "order-1");
    assert_eq!(body["state"], "succeeded");
}

#[tokio::test]
async fn failed_posts_are_retried() {
    let world = World::new().await;
    world.callbacks.respond_with(503).fail_with("connection reset");
    let mut events = world.nexus().subscribe();

    run_to_completion(&world, "order-1", Some(caller())).await;
    let delivered = wait_for(&mut events, |e| matches!(e, Event::CallbackDelivered { .. })).await;

    assert!(
        matches!(delivered, Event::CallbackDelivered { attempts: 3, .. }),
        "{delivered:?}"
    );
    assert_eq!(world.callbacks.calls().len(), 3);
    assert!(world.nexus().delivery_failures().is_empty());
}

#[tokio::test]
async fn exhausted_delivery_is_recorded_and_reported() {
    let world = World::new().await;
    world.callbacks.set_default_status(500);
    let mut events = world.nexus().subscribe();

    run_to_completion(&world, "order-1", Some(caller())).await;
    wait_for(&mut events, |e| matches!(e, Event::CallbackExhausted { .. })).await;

    assert_eq!(world.callbacks.calls().len(), 3);
    let failures = world.nexus().delivery_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(world.notify.calls_for("callbacks").len(), 1);

    // The operation itself is unaffected by the caller being down
    assert_eq!(world.state("order-1").await, OperationState::Succeeded);
}

#[tokio::test]
async fn operations_without_a_callback_post_nothing() {
    let world = World::new().await;
    let mut events = world.nexus().subscribe();

    run_to_completion(&world, "order-1", None).await;
    wait_for(&mut events, |e| matches!(e, Event::OperationCompleted { .. })).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(world.callbacks.calls().is_empty());
}

#[tokio::test]
async fn canceled_operations_are_reported_too() {
    let world = World::new().await;
    let mut events = world.nexus().subscribe();
    world
        .nexus()
        .start(charge("order-1", "r1").with_callback(caller()))
        .await
        .unwrap();
    let start = world.lease(None).await;
    world.accept(&start).await;

    world.nexus().cancel(&charge_key("order-1")).await.unwrap();
    let cancel = world.lease(None).await;
    world.respond(&cancel, TaskResponse::CancelConfirmed).await;
    wait_for(&mut events, |e| matches!(e, Event::CallbackDelivered { .. })).await;

    let calls = world.callbacks.calls();
    assert_eq!(calls[0].body_json()["state"], "canceled");
}

#[tokio::test]
async fn owed_callback_is_sent_after_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = || Arc::new(Store::open(dir.path()).unwrap());
    {
        let world = World::with_store(store()).await;
        world
            .nexus()
            .start(charge("order-1", "r1").with_callback(caller()))
            .await
            .unwrap();
        let start = world.lease(None).await;
        world.accept(&start).await;
        let nexus = Arc::clone(world.nexus());
        world.shutdown().await;

        // Committed after the delivery worker is gone
        let info = nexus
            .complete(
                &charge_key("order-1"),
                Outcome::Succeeded {
                    result: Payload::default(),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(info.state, OperationState::Succeeded);
    }

    let world = World::with_store(store()).await;
    let calls = tokio::time::timeout(WAIT, async {
        loop {
            let calls = world.callbacks.calls();
            if !calls.is_empty() {
                break calls;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("owed callback was not sent after restart");

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].header("X-Caller"), Some("checkout"));
    assert_eq!(calls[0].body_json()["state"], "succeeded");
    assert_eq!(world.state("order-1").await, OperationState::Succeeded);
}
