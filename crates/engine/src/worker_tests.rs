// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::lifecycle::{StartRequest, StartResponse};
use crate::runtime::{Runtime, RuntimeDeps};
use nx_adapters::{FakeAuthGate, FakeCallbackAdapter, FakeNotifyAdapter};
use nx_core::{FakeClock, NexusConfig, Outcome, SequentialIdGen};
use nx_storage::Store;
use std::sync::atomic::{AtomicU32, Ordering};

const CONFIG: &str = r#"
[lifecycle]
start_timeout = "2s"

[[services]]
name = "orders"

[[services.operations]]
name = "quote"
task_queue = "orders-tq"
kind = "sync"

[[services.operations]]
name = "charge"
task_queue = "orders-tq"
kind = "async"
"#;

type TestRuntime = Runtime<FakeAuthGate, FakeNotifyAdapter, FakeClock, SequentialIdGen>;

struct Echo;

#[async_trait]
impl OperationHandler for Echo {
    async fn start(&self, task: &StartTask) -> TaskResponse {
        TaskResponse::Completed {
            outcome: Outcome::Succeeded {
                result: task.input.clone(),
            },
        }
    }
}

#[derive(Default)]
struct Accepting {
    cancels: AtomicU32,
}

#[async_trait]
impl OperationHandler for Arc<Accepting> {
    async fn start(&self, task: &StartTask) -> TaskResponse {
        TaskResponse::Accepted {
            token: format!("tok-{}", task.key.id),
        }
    }

    async fn cancel(&self, _key: &OperationKey, _token: &str) -> TaskResponse {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        TaskResponse::CancelConfirmed
    }
}

async fn runtime() -> TestRuntime {
    Runtime::start(
        NexusConfig::from_toml(CONFIG).unwrap(),
        Arc::new(Store::in_memory()),
        RuntimeDeps {
            auth: FakeAuthGate::new(),
            callbacks: FakeCallbackAdapter::new(),
            notify: FakeNotifyAdapter::new(),
        },
        FakeClock::new(),
        SequentialIdGen::new("lease"),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn worker_answers_sync_start() {
    let rt = runtime().await;
    let nexus = Arc::clone(rt.nexus());
    let worker = Worker::new(
        Arc::clone(&nexus),
        "orders-tq",
        HandlerSet::new().with("orders", "quote", Echo),
    )
    .with_poll_timeout(Duration::from_secs(2));

    let start = tokio::spawn(async move {
        nexus
            .start(StartRequest::new("orders", "quote", "q-1", Payload::new(b"42".to_vec())))
            .await
    });
    assert!(worker.run_once().await.unwrap());

    assert_eq!(
        start.await.unwrap().unwrap(),
        StartResponse::Inline {
            outcome: Outcome::Succeeded {
                result: Payload::new(b"42".to_vec())
            }
        }
    );
}

#[tokio::test]
async fn worker_runs_cancel_tasks() {
    let rt = runtime().await;
    let handler = Arc::new(Accepting::default());
    let worker = Worker::new(
        Arc::clone(rt.nexus()),
        "orders-tq",
        HandlerSet::new().with("orders", "charge", Arc::clone(&handler)),
    )
    .with_poll_timeout(Duration::from_secs(2));

    let nexus = Arc::clone(rt.nexus());
    let start = tokio::spawn(async move {
        nexus
            .start(StartRequest::new("orders", "charge", "c-1", Payload::default()))
            .await
    });
    assert!(worker.run_once().await.unwrap());
    assert!(start.await.unwrap().is_ok());

    let key = OperationKey::new("orders", "charge", "c-1");
    rt.nexus().cancel(&key).await.unwrap();
    assert!(worker.run_once().await.unwrap());

    assert_eq!(handler.cancels.load(Ordering::SeqCst), 1);
    let info = rt.nexus().get_info(&key).await.unwrap();
    assert_eq!(info.state, nx_core::OperationState::Canceled);
}

#[tokio::test]
async fn missing_handler_nacks_the_task() {
    let rt = runtime().await;
    let worker = Worker::new(Arc::clone(rt.nexus()), "orders-tq", HandlerSet::new())
        .with_poll_timeout(Duration::from_millis(500));

    let nexus = Arc::clone(rt.nexus());
    tokio::spawn(async move {
        nexus
            .start(StartRequest::new("orders", "charge", "c-2", Payload::default()))
            .await
    });

    assert!(worker.run_once().await.unwrap());
    let stats = rt.nexus().status().queues;
    assert_eq!(stats.leased, 0);
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn empty_poll_reports_no_work() {
    let rt = runtime().await;
    let worker = Worker::new(Arc::clone(rt.nexus()), "orders-tq", HandlerSet::new())
        .with_poll_timeout(Duration::from_millis(20));
    assert!(!worker.run_once().await.unwrap());
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let rt = runtime().await;
    let worker = Worker::new(Arc::clone(rt.nexus()), "orders-tq", HandlerSet::new())
        .with_poll_timeout(Duration::from_millis(20));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(rx));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
