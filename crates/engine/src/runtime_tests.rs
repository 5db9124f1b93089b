// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime tests

use super::*;
use nx_adapters::{FakeAuthGate, FakeCallbackAdapter, FakeNotifyAdapter};
use nx_core::error::DISPATCH_EXHAUSTED;
use nx_core::{CallbackTarget, FakeClock, OperationState, Payload, SequentialIdGen};

const CONFIG: &str = r#"
[dispatch]
lease_timeout = "5s"
max_attempts = 2

[lifecycle]
start_timeout = "50ms"
dedup_grace = "10m"

[delivery]
initial_backoff = "1ms"
max_backoff = "5ms"
max_attempts = 3

[[services]]
name = "orders"

[[services.operations]]
name = "charge"
task_queue = "orders-tq"
kind = "async"
"#;

const TQ: &str = "orders-tq";
const WAIT: Duration = Duration::from_secs(5);

type TestRuntime = Runtime<FakeAuthGate, FakeNotifyAdapter, FakeClock, SequentialIdGen>;

struct Harness {
    runtime: TestRuntime,
    callbacks: FakeCallbackAdapter,
    notify: FakeNotifyAdapter,
    clock: FakeClock,
}

impl Harness {
    fn nexus(&self) -> &Nexus<FakeAuthGate, FakeNotifyAdapter, FakeClock, SequentialIdGen> {
        self.runtime.nexus()
    }
}

async fn setup_with(store: Arc<Store>) -> Harness {
    let config = NexusConfig::from_toml(CONFIG).unwrap();
    let callbacks = FakeCallbackAdapter::new();
    let notify = FakeNotifyAdapter::new();
    let clock = FakeClock::new();
    let runtime = Runtime::start(
        config,
        store,
        RuntimeDeps {
            auth: FakeAuthGate::new(),
            callbacks: callbacks.clone(),
            notify: notify.clone(),
        },
        clock.clone(),
        SequentialIdGen::new("lease"),
    )
    .await
    .unwrap();
    Harness {
        runtime,
        callbacks,
        notify,
        clock,
    }
}

async fn setup() -> Harness {
    setup_with(Arc::new(Store::in_memory())).await
}

fn charge(id: &str) -> StartRequest {
    StartRequest::new("orders", "charge", id, Payload::default()).with_request_id(format!("req-{id}"))
}

fn key(id: &str) -> OperationKey {
    OperationKey::new("orders", "charge", id)
}

async fn lease(h: &Harness) -> nx_core::TaskLease {
    match h.nexus().poll_task(TQ, None, WAIT).await {
        PollOutcome::Task(lease) => lease,
        PollOutcome::NoTask => panic!("expected a task"),
    }
}

#[tokio::test]
async fn async_completion_reaches_the_callback() {
    let h = setup().await;
    let mut events = h.nexus().subscribe();
    h.nexus()
        .start(charge("order-42").with_callback(CallbackTarget::new("https://caller.test/cb")))
        .await
        .unwrap();

    let start = lease(&h).await;
    h.nexus()
        .respond_task(&start.lease_id, TaskResponse::Accepted { token: "tok".into() }, None)
        .await
        .unwrap();
    h.nexus()
        .complete(
            &key("order-42"),
            Outcome::Succeeded {
                result: Payload::new(b"paid".to_vec()),
            },
            None,
        )
        .await
        .unwrap();

    loop {
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if matches!(event, Event::CallbackDelivered { .. }) {
            break;
        }
    }
    let calls = h.callbacks.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body_json()["state"], "succeeded");
    assert_eq!(h.nexus().status().queues.leased, 0);
    h.runtime.shutdown().await;
}

#[tokio::test]
async fn respond_on_unknown_lease_is_not_found() {
    let h = setup().await;
    let err = h
        .nexus()
        .respond_task(&LeaseId::from("nope"), TaskResponse::CancelConfirmed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, NexusError::NotFound(_)));
}

#[tokio::test]
async fn unrecorded_response_redelivers_the_task() {
    let h = setup().await;
    h.nexus().start(charge("order-42")).await.unwrap();

    let first = lease(&h).await;
    let err = h
        .nexus()
        .respond_task(&first.lease_id, TaskResponse::CancelConfirmed, None)
        .await
        .unwrap_err();
    assert!(matches!(err, NexusError::InvalidArgument(_)));

    let second = lease(&h).await;
    assert_eq!(second.task.id, first.task.id);
    assert_eq!(second.attempt, 2);
}

#[tokio::test]
async fn expired_leases_end_in_dispatch_exhausted() {
    let h = setup().await;
    h.nexus().start(charge("order-42")).await.unwrap();

    for _ in 0..2 {
        lease(&h).await;
        h.clock.advance(Duration::from_secs(6));
        h.nexus().tick().await;
    }

    let result = h.nexus().get_result(&key("order-42"), None).await.unwrap();
    let OperationResult::Failed { failure } = result else {
        panic!("expected failure, got {result:?}");
    };
    assert_eq!(failure.code, DISPATCH_EXHAUSTED);
    assert_eq!(h.notify.calls_for("dispatch").len(), 1);
}

#[tokio::test]
async fn eviction_drops_expired_dedup_entries() {
    let h = setup().await;
    h.nexus().start(charge("order-42")).await.unwrap();
    let start = lease(&h).await;
    h.nexus()
        .respond_task(
            &start.lease_id,
            TaskResponse::Completed {
                outcome: Outcome::Succeeded {
                    result: Payload::default(),
                },
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(h.nexus().evict().unwrap(), 0);
    h.clock.advance(Duration::from_secs(11 * 60));
    assert_eq!(h.nexus().evict().unwrap(), 1);

    // The record outlives its dedup entry, so a retry still joins it
    let info = h.nexus().get_info(&key("order-42")).await.unwrap();
    assert_eq!(info.state, OperationState::Succeeded);
    let retry = h.nexus().start(charge("order-42")).await;
    assert!(retry.is_ok(), "retry after eviction should join: {retry:?}");
    assert_eq!(h.nexus().status().operations, 1);
}

#[tokio::test]
async fn restart_recovers_pending_work() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let h = setup_with(store).await;
        h.nexus().start(charge("order-1")).await.unwrap();
        h.runtime.shutdown().await;
    }

    let store = Arc::new(Store::open(dir.path()).unwrap());
    let h = setup_with(store).await;
    assert_eq!(h.nexus().status().queues.pending, 1);
    let task = lease(&h).await;
    assert_eq!(task.task.operation, key("order-1"));
}

#[tokio::test]
async fn duplicate_registration_fails_startup() {
    let mut config = NexusConfig::from_toml(CONFIG).unwrap();
    let duplicate = config.services[0].clone();
    config.services.push(duplicate);

    let result: Result<TestRuntime, _> = Runtime::start(
        config,
        Arc::new(Store::in_memory()),
        RuntimeDeps {
            auth: FakeAuthGate::new(),
            callbacks: FakeCallbackAdapter::new(),
            notify: FakeNotifyAdapter::new(),
        },
        FakeClock::new(),
        SequentialIdGen::new("lease"),
    )
    .await;
    assert!(matches!(result, Err(RuntimeError::Registry(_))));
}
