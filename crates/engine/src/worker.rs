// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process worker that polls a task queue and runs handlers

use crate::distribution::PollOutcome;
use crate::runtime::Nexus;
use async_trait::async_trait;
use nx_adapters::{AuthGate, NotifyAdapter};
use nx_core::{
    BuildId, Clock, IdGen, NexusError, OperationKey, Payload, RequestId, TaskKind, TaskLease,
    TaskResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// A start task as seen by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTask {
    pub key: OperationKey,
    pub request_id: RequestId,
    pub input: Payload,
    /// 1 on first delivery; higher on redelivery
    pub attempt: u32,
}

/// Handler code for one `(service, operation)`
#[async_trait]
pub trait OperationHandler: Send + Sync + 'static {
    async fn start(&self, task: &StartTask) -> TaskResponse;

    async fn cancel(&self, _key: &OperationKey, _token: &str) -> TaskResponse {
        TaskResponse::CancelConfirmed
    }
}

/// Handlers by `(service, operation)`
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<(String, String), Arc<dyn OperationHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        service: &str,
        operation: &str,
        handler: impl OperationHandler,
    ) -> Self {
        self.handlers
            .insert((service.to_string(), operation.to_string()), Arc::new(handler));
        self
    }

    fn get(&self, key: &OperationKey) -> Option<Arc<dyn OperationHandler>> {
        self.handlers
            .get(&(key.service.clone(), key.operation.clone()))
            .cloned()
    }
}

pub struct Worker<A: AuthGate, N: NotifyAdapter, C: Clock, I: IdGen> {
    nexus: Arc<Nexus<A, N, C, I>>,
    task_queue: String,
    build_id: Option<BuildId>,
    handlers: HandlerSet,
    poll_timeout: Duration,
}

impl<A, N, C, I> Worker<A, N, C, I>
where
    A: AuthGate,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(nexus: Arc<Nexus<A, N, C, I>>, task_queue: impl Into<String>, handlers: HandlerSet) -> Self {
        Self {
            nexus,
            task_queue: task_queue.into(),
            build_id: None,
            handlers,
            poll_timeout: Duration::from_secs(30),
        }
    }

    /// Opt into versioned routing as `build_id`
    pub fn with_build_id(mut self, build_id: impl Into<BuildId>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Poll once and run whatever arrives; `false` if the poll came back empty
    pub async fn run_once(&self) -> Result<bool, NexusError> {
        let outcome = self
            .nexus
            .poll_task(&self.task_queue, self.build_id.as_ref(), self.poll_timeout)
            .await;
        match outcome {
            PollOutcome::NoTask => Ok(false),
            PollOutcome::Task(lease) => {
                self.handle(lease).await?;
                Ok(true)
            }
        }
    }

    async fn handle(&self, lease: TaskLease) -> Result<(), NexusError> {
        let key = &lease.task.operation;
        let Some(handler) = self.handlers.get(key) else {
            tracing::warn!(operation_id = %key, task_queue = %self.task_queue, "no handler registered");
            return self
                .nexus
                .nack_task(&lease.lease_id, "no handler registered")
                .await;
        };

        let response = match &lease.task.kind {
            TaskKind::Start {
                request_id, input, ..
            } => {
                let task = StartTask {
                    key: key.clone(),
                    request_id: request_id.clone(),
                    input: input.clone(),
                    attempt: lease.attempt,
                };
                handler.start(&task).await
            }
            TaskKind::Cancel { token } => handler.cancel(key, token).await,
        };
        tracing::debug!(operation_id = %key, response = response.as_str(), "handler answered");
        self.nexus
            .respond_task(&lease.lease_id, response, self.build_id.clone())
            .await
    }

    /// Poll until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(task_queue = %self.task_queue, build_id = ?self.build_id, "worker started");
        loop {
            tokio::select! {
                result = self.run_once() => {
                    if let Err(e) = result {
                        tracing::warn!(task_queue = %self.task_queue, error = %e, "task failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::info!(task_queue = %self.task_queue, "worker stopped");
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
