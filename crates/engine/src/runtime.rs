// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime wiring for the Nexus engine

use crate::delivery::{self, DeliveryFailure, DeliveryFailures, DeliveryWorker};
use crate::distribution::{PollOutcome, QueueStats, TaskDistributor};
use crate::error::LifecycleError;
use crate::events::EventBus;
use crate::executor::Executor;
use crate::lifecycle::{
    CancelOutcome, LifecycleEngine, OperationInfo, OperationResult, StartRequest, StartResponse,
};
use crate::versioning::VersionService;
use nx_adapters::{AuthGate, CallbackAdapter, NotifyAdapter, TracedAuthGate, TracedNotifyAdapter};
use nx_core::registry::RegistryError;
use nx_core::{
    BuildId, CallbackMessage, Clock, DeadLetter, Event, IdGen, LeaseId, Mutation, NexusConfig,
    DispatchTarget, NexusError, OperationKey, OrderingView, Outcome, Registry, RequestId,
    SetOrdering, TaskResponse,
};
use nx_storage::{Applied, Store};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Errors while starting the runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid service registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("recovery failed: {0}")]
    Recovery(#[from] LifecycleError),
}

/// Adapters the engine talks to
pub struct NexusDeps<A, N> {
    pub auth: A,
    pub notify: N,
}

/// Snapshot for the status verb
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NexusStatus {
    pub operations: usize,
    pub queues: QueueStats,
    pub delivery_failures: usize,
}

/// The engine: every external verb lands here
pub struct Nexus<A: AuthGate, N: NotifyAdapter, C: Clock, I: IdGen> {
    config: NexusConfig,
    store: Arc<Store>,
    distributor: Arc<TaskDistributor<C, I>>,
    lifecycle: LifecycleEngine<TracedAuthGate<A>, C, I>,
    versions: VersionService<C, I>,
    notify: TracedNotifyAdapter<N>,
    events: EventBus,
    failures: DeliveryFailures,
    clock: C,
}

impl<A, N, C, I> Nexus<A, N, C, I>
where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(
        config: NexusConfig,
        registry: Registry,
        store: Arc<Store>,
        deps: NexusDeps<A, N>,
        deliveries: mpsc::Sender<CallbackMessage>,
        clock: C,
        ids: I,
    ) -> Self {
        let events = EventBus::new();
        let distributor = Arc::new(TaskDistributor::new(
            Arc::clone(&store),
            clock.clone(),
            ids,
            &config.dispatch,
            events.clone(),
        ));
        let executor = Arc::new(Executor::new(
            Arc::clone(&distributor),
            deliveries,
            events.clone(),
        ));
        let lifecycle = LifecycleEngine::new(
            Arc::clone(&store),
            Arc::new(registry),
            Arc::clone(&distributor),
            Arc::clone(&executor),
            TracedAuthGate::new(deps.auth),
            clock.clone(),
            config.lifecycle.clone(),
        );
        let versions = VersionService::new(
            Arc::clone(&store),
            Arc::clone(&distributor),
            executor,
            config.dispatch.max_depth,
            config.lifecycle.cas_retries,
        );

        Self {
            config,
            store,
            distributor,
            lifecycle,
            versions,
            notify: TracedNotifyAdapter::new(deps.notify),
            events,
            failures: DeliveryFailures::default(),
            clock,
        }
    }

    pub fn config(&self) -> &NexusConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Shared handle the delivery worker records give-ups into
    pub fn failure_log(&self) -> DeliveryFailures {
        self.failures.clone()
    }

    pub fn delivery_failures(&self) -> Vec<DeliveryFailure> {
        self.failures.list()
    }

    pub fn status(&self) -> NexusStatus {
        NexusStatus {
            operations: self.store.operation_count(),
            queues: self.distributor.stats(),
            delivery_failures: self.failures.len(),
        }
    }

    // -------------------------------------------------------------------------
    // Caller verbs
    // -------------------------------------------------------------------------

    pub async fn start(&self, request: StartRequest) -> Result<StartResponse, NexusError> {
        self.lifecycle.start(request).await
    }

    pub async fn cancel(&self, key: &OperationKey) -> Result<OperationInfo, NexusError> {
        self.lifecycle.cancel(key).await
    }

    pub async fn cancel_by_request(
        &self,
        service: &str,
        operation: &str,
        request_id: &RequestId,
    ) -> Result<CancelOutcome, NexusError> {
        self.lifecycle
            .cancel_by_request(service, operation, request_id)
            .await
    }

    pub async fn get_info(&self, key: &OperationKey) -> Result<OperationInfo, NexusError> {
        self.lifecycle.get_info(key).await
    }

    pub async fn get_result(
        &self,
        key: &OperationKey,
        wait: Option<Duration>,
    ) -> Result<OperationResult, NexusError> {
        self.lifecycle.get_result(key, wait).await
    }

    pub async fn complete(
        &self,
        key: &OperationKey,
        outcome: Outcome,
        build_id: Option<BuildId>,
    ) -> Result<OperationInfo, NexusError> {
        self.lifecycle.complete(key, outcome, build_id).await
    }

    // -------------------------------------------------------------------------
    // Version graph administration
    // -------------------------------------------------------------------------

    pub async fn set_ordering(
        &self,
        task_queue: &str,
        request: &SetOrdering,
    ) -> Result<u64, NexusError> {
        self.versions.set_ordering(task_queue, request).await
    }

    pub fn get_ordering(&self, task_queue: &str, max_depth: Option<usize>) -> OrderingView {
        self.versions.get_ordering(task_queue, max_depth)
    }

    // -------------------------------------------------------------------------
    // Worker verbs
    // -------------------------------------------------------------------------

    pub async fn poll_task(
        &self,
        task_queue: &str,
        build_id: Option<&BuildId>,
        timeout: Duration,
    ) -> PollOutcome {
        self.distributor.poll(task_queue, build_id, timeout).await
    }

    /// Record a worker's answer and settle the lease
    ///
    /// The lease is acked only after the answer is durable; if recording
    /// fails the task is nacked for redelivery.
    pub async fn respond_task(
        &self,
        lease_id: &LeaseId,
        response: TaskResponse,
        build_id: Option<BuildId>,
    ) -> Result<(), NexusError> {
        let lease = self
            .distributor
            .leased(lease_id)
            .ok_or_else(|| NexusError::NotFound(format!("lease {}", lease_id)))?;
        let build_id = build_id.or(match &lease.target {
            DispatchTarget::Build(b) => Some(b.clone()),
            DispatchTarget::Unversioned => None,
        });

        match self
            .lifecycle
            .record_task_response(&lease.task, response, build_id)
            .await
        {
            Ok(()) => {
                self.distributor.ack(lease_id);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(lease_id = %lease_id, error = %e, "task response not recorded");
                if let Some(dead) = self.distributor.nack(lease_id, &e.to_string()) {
                    self.bury(dead).await;
                }
                Err(e.into())
            }
        }
    }

    pub fn ack_task(&self, lease_id: &LeaseId) -> bool {
        self.distributor.ack(lease_id)
    }

    pub async fn nack_task(&self, lease_id: &LeaseId, reason: &str) -> Result<(), NexusError> {
        let dead = self
            .distributor
            .nack(lease_id, reason)
            .ok_or_else(|| NexusError::NotFound(format!("lease {}", lease_id)))?;
        self.bury(dead).await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Maintenance
    // -------------------------------------------------------------------------

    /// Expire overdue leases; returns how many tasks were dead-lettered
    pub async fn tick(&self) -> usize {
        let dead = self.distributor.tick();
        let count = dead.len();
        self.bury(dead).await;
        count
    }

    async fn bury(&self, dead: Vec<DeadLetter>) {
        for letter in dead {
            let task = &letter.queued.task;
            let text = format!(
                "{} task for {} dead-lettered after {} attempts: {}",
                task.kind.as_str(),
                task.operation,
                letter.queued.attempts,
                letter.reason
            );
            if let Err(e) = self.notify.send("dispatch", &text).await {
                tracing::warn!(error = %e, "failed to report dead letter");
            }
            if let Err(e) = self.lifecycle.on_dead_letter(&letter).await {
                tracing::error!(operation_id = %task.operation, error = %e, "failed to fail dead-lettered operation");
            }
        }
    }

    /// Drop dedup entries and cancel markers past their grace window
    pub fn evict(&self) -> Result<usize, NexusError> {
        let now = self.clock.utc_now();
        match self.store.commit(Mutation::Evict { now }) {
            Ok(Applied::Evicted(count)) => {
                if count > 0 {
                    tracing::info!(count, "evicted expired dedup entries");
                }
                Ok(count)
            }
            Ok(_) => Ok(0),
            Err(e) => {
                tracing::error!(error = %e, "eviction failed");
                Err(NexusError::Internal)
            }
        }
    }

    pub async fn recover(&self) -> Result<usize, LifecycleError> {
        self.lifecycle.recover().await
    }
}

/// Adapters for a full runtime
pub struct RuntimeDeps<A, CB, N> {
    pub auth: A,
    pub callbacks: CB,
    pub notify: N,
}

/// A running engine with its background loops
pub struct Runtime<A: AuthGate, N: NotifyAdapter, C: Clock, I: IdGen> {
    nexus: Arc<Nexus<A, N, C, I>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<A, N, C, I> Runtime<A, N, C, I>
where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    /// Build the engine from configuration, spawn the delivery worker, recover
    /// open work and start the maintenance loop
    pub async fn start<CB: CallbackAdapter>(
        config: NexusConfig,
        store: Arc<Store>,
        deps: RuntimeDeps<A, CB, N>,
        clock: C,
        ids: I,
    ) -> Result<Self, RuntimeError> {
        let registry = Registry::from_config(&config.services)?;
        tracing::info!(
            operations = registry.len(),
            task_queues = ?registry.task_queues(),
            "registry loaded"
        );

        let (deliveries, delivery_rx) = delivery::channel(config.delivery.queue_capacity);
        let outbox = Arc::clone(&store);
        let nexus = Arc::new(Nexus::new(
            config.clone(),
            registry,
            store,
            NexusDeps {
                auth: deps.auth,
                notify: deps.notify.clone(),
            },
            deliveries,
            clock.clone(),
            ids,
        ));

        // Running before recovery, which may re-queue more callbacks than
        // the channel holds
        let worker = DeliveryWorker::new(
            deps.callbacks,
            deps.notify,
            clock,
            config.delivery.backoff(),
            nexus.events().clone(),
            nexus.failure_log(),
            outbox,
        );
        let delivery = tokio::spawn(worker.run(delivery_rx));
        if let Err(e) = nexus.recover().await {
            delivery.abort();
            return Err(e.into());
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            delivery,
            tokio::spawn(maintenance_loop(Arc::clone(&nexus), shutdown_rx)),
        ];

        Ok(Self {
            nexus,
            shutdown,
            tasks,
        })
    }

    pub fn nexus(&self) -> &Arc<Nexus<A, N, C, I>> {
        &self.nexus
    }

    /// Stop the maintenance loop; in-flight deliveries are abandoned
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
        tracing::info!("runtime stopped");
    }
}

async fn maintenance_loop<A, N, C, I>(
    nexus: Arc<Nexus<A, N, C, I>>,
    mut shutdown: watch::Receiver<bool>,
) where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    let mut tick = tokio::time::interval(nexus.config().dispatch.tick_interval);
    let mut evict = tokio::time::interval(nexus.config().lifecycle.eviction_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    evict.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                nexus.tick().await;
            }
            _ = evict.tick() => {
                let _ = nexus.evict();
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("maintenance loop stopped");
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
