//! Shared harness for the behavioral specs

#![allow(dead_code)]

pub use std::sync::Arc;
pub use std::time::Duration;

pub use nx_adapters::{FakeAuthGate, FakeCallbackAdapter, FakeNotifyAdapter};
pub use nx_core::{
    BuildId, CallbackTarget, DispatchTarget, Event, FakeClock, NexusConfig, NexusError,
    OperationKey, OperationState, Outcome, Payload, RequestId, SequentialIdGen, SetOrdering,
    TaskKind, TaskLease, TaskResponse,
};
pub use nx_engine::{
    CancelOutcome, Nexus, OperationResult, PollOutcome, Runtime, RuntimeDeps, StartRequest,
    StartResponse,
};
pub use nx_storage::Store;
pub use tokio::sync::broadcast;

pub const TQ: &str = "orders-tq";
pub const WAIT: Duration = Duration::from_secs(5);

/// Three handler kinds on one task queue
pub const CONFIG: &str = r#"
[dispatch]
lease_timeout = "5s"
max_attempts = 3

[lifecycle]
start_timeout = "300ms"
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

[[services.operations]]
name = "quote"
task_queue = "orders-tq"
kind = "sync"

[[services.operations]]
name = "notify"
task_queue = "orders-tq"
kind = "fire_and_forget"
"#;

pub type TestNexus = Nexus<FakeAuthGate, FakeNotifyAdapter, FakeClock, SequentialIdGen>;
type TestRuntime = Runtime<FakeAuthGate, FakeNotifyAdapter, FakeClock, SequentialIdGen>;

/// A running engine plus handles on its fakes
pub struct World {
    runtime: TestRuntime,
    pub callbacks: FakeCallbackAdapter,
    pub notify: FakeNotifyAdapter,
    pub clock: FakeClock,
}

impl World {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(Store::in_memory())).await
    }

    pub async fn with_store(store: Arc<Store>) -> Self {
        let callbacks = FakeCallbackAdapter::new();
        let notify = FakeNotifyAdapter::new();
        let clock = FakeClock::new();
        let runtime = Runtime::start(
            NexusConfig::from_toml(CONFIG).unwrap(),
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
        Self {
            runtime,
            callbacks,
            notify,
            clock,
        }
    }

    pub fn nexus(&self) -> &Arc<TestNexus> {
        self.runtime.nexus()
    }

    /// Lease the next task for `build`, failing if none arrives
    pub async fn lease(&self, build: Option<&str>) -> TaskLease {
        let build = build.map(BuildId::from);
        match self.nexus().poll_task(TQ, build.as_ref(), WAIT).await {
            PollOutcome::Task(lease) => lease,
            PollOutcome::NoTask => panic!("expected a task for {build:?}"),
        }
    }

    /// True when `build` has nothing to hand out right now
    pub async fn idle(&self, build: Option<&str>) -> bool {
        let build = build.map(BuildId::from);
        matches!(
            self.nexus()
                .poll_task(TQ, build.as_ref(), Duration::from_millis(20))
                .await,
            PollOutcome::NoTask
        )
    }

    pub async fn respond(&self, lease: &TaskLease, response: TaskResponse) {
        self.nexus()
            .respond_task(&lease.lease_id, response, None)
            .await
            .unwrap();
    }

    /// Answer a start task with an async acceptance
    pub async fn accept(&self, lease: &TaskLease) {
        let token = format!("tok-{}", lease.task.operation.id);
        self.respond(lease, TaskResponse::Accepted { token }).await;
    }

    pub async fn state(&self, id: &str) -> OperationState {
        self.nexus().get_info(&charge_key(id)).await.unwrap().state
    }

    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
    }
}

pub fn charge(id: &str, request_id: &str) -> StartRequest {
    StartRequest::new("orders", "charge", id, Payload::new(b"{\"amount\":42}".to_vec()))
        .with_request_id(request_id)
}

pub fn charge_key(id: &str) -> OperationKey {
    OperationKey::new("orders", "charge", id)
}

pub fn accepted(id: &str) -> StartResponse {
    StartResponse::AsyncAccepted {
        operation_id: id.to_string(),
    }
}

/// Receive events until one matches
pub async fn wait_for(
    events: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event bus closed");
        if pred(&event) {
            return event;
        }
    }
}
