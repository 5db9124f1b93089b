// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation lifecycle engine
//!
//! Every write goes through the store as a compare-and-swap on the record's
//! version: load, run the pure transition, commit with the version that was
//! read, retry on conflict. Effects run only after the commit succeeded.
//! Waiters (Start, GetResult with a deadline) subscribe to a per-operation
//! watch channel that is bumped after each commit.

use crate::distribution::TaskDistributor;
use crate::error::LifecycleError;
use crate::executor::Executor;
use nx_adapters::{AuthGate, AuthRequest, AuthVerb};
use nx_core::config::LifecycleConfig;
use nx_core::error::{DISPATCH_EXHAUSTED, INVALID_HANDLER_RESPONSE};
use nx_core::operation::TransitionError;
use nx_core::{
    start_task_id, BuildId, CallbackTarget, Capability, Clock, DeadLetter, DedupKey, Effect,
    Event, HandlerDescriptor, HandlerFailure, HandlerKind, IdGen, Mutation, NewOperation,
    NexusError, OperationInput, OperationKey, OperationRecord, OperationState, Outcome, Payload,
    Registry, RequestId, Task, TaskKind, TaskResponse,
};
use nx_storage::{ApplyError, Applied, Store, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Arguments of a Start call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub service: String,
    pub operation: String,
    /// Caller-chosen operation id
    pub id: String,
    /// Derived from `(service, operation, id)` when absent
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub input: Payload,
    #[serde(default)]
    pub callback: Option<CallbackTarget>,
}

impl StartRequest {
    /// New request with a fresh request id, reused by every retry of this value
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        id: impl Into<String>,
        input: Payload,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            id: id.into(),
            request_id: Some(RequestId::generate()),
            input,
            callback: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn without_request_id(mut self) -> Self {
        self.request_id = None;
        self
    }

    pub fn with_callback(mut self, callback: CallbackTarget) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn key(&self) -> OperationKey {
        OperationKey::new(&self.service, &self.operation, &self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum StartResponse {
    /// The handler answered before Start returned
    Inline { outcome: Outcome },
    /// The operation runs on; poll or await the callback
    AsyncAccepted { operation_id: String },
}

/// Answer to GetInfo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub service: String,
    pub operation: String,
    pub operation_id: String,
    pub request_id: RequestId,
    pub state: OperationState,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&OperationRecord> for OperationInfo {
    fn from(record: &OperationRecord) -> Self {
        Self {
            service: record.key.service.clone(),
            operation: record.key.operation.clone(),
            operation_id: record.key.id.clone(),
            request_id: record.request_id.clone(),
            state: record.state,
            cancel_requested: record.cancel_requested,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

/// Answer to GetResult
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OperationResult {
    Succeeded { result: Payload },
    Failed { failure: HandlerFailure },
    Canceled,
    /// Not terminal when the wait ended; never a failure of the operation
    StillRunning { state: OperationState },
}

/// Answer to a cancel addressed by request id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CancelOutcome {
    /// The request already has an operation; it was canceled like any other
    Operation { info: OperationInfo },
    /// No Start seen yet; the matching Start will cancel immediately
    Marked { request_id: RequestId },
}

fn later(now: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn start_task(record: &OperationRecord) -> Task {
    Task::start(
        start_task_id(&record.key),
        record.key.clone(),
        record.request_id.clone(),
        record.input.clone(),
        record.callback.clone(),
    )
}

fn is_stale(err: &LifecycleError) -> bool {
    matches!(
        err,
        LifecycleError::Transition(TransitionError::Terminal { .. })
            | LifecycleError::Transition(TransitionError::Invalid { .. })
    )
}

pub struct LifecycleEngine<A: AuthGate, C: Clock, I: IdGen> {
    store: Arc<Store>,
    registry: Arc<Registry>,
    distributor: Arc<TaskDistributor<C, I>>,
    executor: Arc<Executor<C, I>>,
    auth: A,
    clock: C,
    config: LifecycleConfig,
    watchers: Mutex<HashMap<OperationKey, watch::Sender<OperationState>>>,
}

impl<A: AuthGate, C: Clock, I: IdGen> LifecycleEngine<A, C, I> {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<Registry>,
        distributor: Arc<TaskDistributor<C, I>>,
        executor: Arc<Executor<C, I>>,
        auth: A,
        clock: C,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            registry,
            distributor,
            executor,
            auth,
            clock,
            config,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Caller verbs
    // -------------------------------------------------------------------------

    /// Start an operation, or join the one its request id already created
    pub async fn start(&self, request: StartRequest) -> Result<StartResponse, NexusError> {
        let key = request.key();
        let result = self.start_inner(request).await;
        if let Err(e) = &result {
            tracing::info!(operation_id = %key, error = %e, "start rejected");
        }
        result.map_err(Into::into)
    }

    async fn start_inner(&self, request: StartRequest) -> Result<StartResponse, LifecycleError> {
        if request.id.is_empty() {
            return Err(NexusError::InvalidArgument("operation id is required".into()).into());
        }
        let descriptor = self.registry.resolve(&request.service, &request.operation)?;
        descriptor.require(match descriptor.kind {
            HandlerKind::Sync => Capability::StartSync,
            _ => Capability::StartAsync,
        })?;
        if let Some(callback) = &request.callback {
            if !(callback.url.starts_with("http://") || callback.url.starts_with("https://")) {
                return Err(NexusError::InvalidArgument(format!(
                    "callback url must be http or https: {}",
                    callback.url
                ))
                .into());
            }
        }
        self.auth
            .authorize(&AuthRequest::new(
                AuthVerb::Start,
                &request.service,
                &request.operation,
                &request.id,
            ))
            .await?;

        let key = request.key();
        let request_id = request
            .request_id
            .unwrap_or_else(|| RequestId::derive(&key.service, &key.operation, &key.id));
        let now = self.clock.utc_now();
        let record = OperationRecord::new(
            NewOperation {
                key: key.clone(),
                request_id,
                input: request.input,
                callback: request.callback,
                kind: descriptor.kind,
                task_queue: descriptor.task_queue.clone(),
            },
            now,
        );

        let committed = self.store.commit(Mutation::OperationCreate {
            record,
            terminal_expires_at: later(now, self.config.dedup_grace),
        });

        match committed {
            Ok(Applied::Operation(created)) => {
                self.executor
                    .execute(Effect::Emit(Event::OperationCreated {
                        key: created.key.clone(),
                        task_queue: created.task_queue.clone(),
                    }))
                    .await?;

                if created.is_terminal() {
                    tracing::info!(operation_id = %created.key, "cancel marker consumed, never dispatched");
                    self.executor
                        .execute(Effect::Emit(Event::OperationCompleted {
                            key: created.key.clone(),
                            state: created.state,
                        }))
                        .await?;
                    self.publish(&created);
                    return Err(NexusError::CanceledBeforeStarted(created.key.id).into());
                }

                tracing::info!(
                    operation_id = %created.key,
                    request_id = %created.request_id,
                    kind = created.kind.as_str(),
                    "operation created"
                );
                self.distributor
                    .enqueue(&created.task_queue, start_task(&created));
                self.respond(&descriptor, created).await
            }
            Ok(other) => {
                tracing::error!(applied = ?other, "unexpected result for operation create");
                Err(NexusError::Internal.into())
            }
            Err(StoreError::Apply(ApplyError::DuplicateRequest { operation_id, .. })) => {
                let existing = self.load(&OperationKey::new(
                    &key.service,
                    &key.operation,
                    operation_id,
                ))?;
                tracing::info!(operation_id = %existing.key, state = %existing.state, "start joined existing operation");
                self.respond(&descriptor, existing).await
            }
            Err(StoreError::Apply(ApplyError::IdInUse(key))) => {
                Err(NexusError::AlreadyExists { id: key.id }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Shape the Start answer from the operation's state, waiting briefly for
    /// the handler when it has not answered yet
    async fn respond(
        &self,
        descriptor: &HandlerDescriptor,
        record: OperationRecord,
    ) -> Result<StartResponse, LifecycleError> {
        let fire_and_forget = matches!(descriptor.kind, HandlerKind::FireAndForget);
        let record = if record.state == OperationState::Pending && !fire_and_forget {
            self.wait_until(&record.key, self.config.start_timeout, |r| {
                r.state != OperationState::Pending
            })
            .await?
        } else {
            record
        };

        let accepted = StartResponse::AsyncAccepted {
            operation_id: record.key.id.clone(),
        };
        if record.canceled_before_start {
            return Err(NexusError::CanceledBeforeStarted(record.key.id).into());
        }
        match record.state {
            OperationState::Pending if matches!(descriptor.kind, HandlerKind::Sync) => {
                Err(NexusError::Timeout.into())
            }
            OperationState::Pending | OperationState::Started => Ok(accepted),
            _ if fire_and_forget || record.started_async => Ok(accepted),
            _ => match record.outcome() {
                Some(outcome) => Ok(StartResponse::Inline { outcome }),
                None => Ok(accepted),
            },
        }
    }

    /// Cancel an addressable operation
    ///
    /// A start task still waiting in its queue is withdrawn and the operation
    /// is canceled on the spot. Otherwise the request is recorded and
    /// forwarded to the handler once it has accepted the work.
    pub async fn cancel(&self, key: &OperationKey) -> Result<OperationInfo, NexusError> {
        self.cancel_inner(key).await.map_err(Into::into)
    }

    async fn cancel_inner(&self, key: &OperationKey) -> Result<OperationInfo, LifecycleError> {
        let descriptor = self.registry.resolve(&key.service, &key.operation)?;
        descriptor.require(Capability::Cancel)?;
        self.auth
            .authorize(&AuthRequest::new(
                AuthVerb::Cancel,
                &key.service,
                &key.operation,
                &key.id,
            ))
            .await?;
        self.cancel_authorized(key).await
    }

    async fn cancel_authorized(&self, key: &OperationKey) -> Result<OperationInfo, LifecycleError> {
        let record = self.load(key)?;
        if record.is_terminal() {
            tracing::debug!(operation_id = %key, state = %record.state, "cancel of finished operation");
            return Ok(OperationInfo::from(&record));
        }

        let input = if record.state == OperationState::Pending
            && self.distributor.withdraw(&start_task_id(key))
        {
            tracing::info!(operation_id = %key, "start task withdrawn before delivery");
            OperationInput::CancelConfirmed
        } else {
            OperationInput::CancelRequested
        };

        match self.update(key, input).await {
            Ok(record) => Ok(OperationInfo::from(&record)),
            // Finished while we were canceling
            Err(e) if is_stale(&e) => Ok(OperationInfo::from(&self.load(key)?)),
            Err(e) => Err(e),
        }
    }

    /// Cancel by request id, before or after the matching Start was seen
    pub async fn cancel_by_request(
        &self,
        service: &str,
        operation: &str,
        request_id: &RequestId,
    ) -> Result<CancelOutcome, NexusError> {
        self.cancel_by_request_inner(service, operation, request_id)
            .await
            .map_err(Into::into)
    }

    async fn cancel_by_request_inner(
        &self,
        service: &str,
        operation: &str,
        request_id: &RequestId,
    ) -> Result<CancelOutcome, LifecycleError> {
        let descriptor = self.registry.resolve(service, operation)?;
        descriptor.require(Capability::Cancel)?;
        self.auth
            .authorize(&AuthRequest::new(
                AuthVerb::Cancel,
                service,
                operation,
                request_id.to_string(),
            ))
            .await?;

        let dedup = DedupKey::new(service, operation, request_id.clone());
        if let Some(operation_id) = self.store.dedup_entry(&dedup) {
            let key = OperationKey::new(service, operation, operation_id);
            let info = self.cancel_authorized(&key).await?;
            return Ok(CancelOutcome::Operation { info });
        }

        let now = self.clock.utc_now();
        match self.store.commit(Mutation::CancelMarkerPut {
            key: dedup.clone(),
            created_at: now,
            expires_at: later(now, self.config.dedup_grace),
        }) {
            Ok(applied) => {
                let created = matches!(applied, Applied::CancelMarker { created: true });
                tracing::info!(request = %dedup, created, "cancel marker recorded");
                Ok(CancelOutcome::Marked {
                    request_id: request_id.clone(),
                })
            }
            // Start won the race
            Err(StoreError::Apply(ApplyError::AlreadyStarted { operation_id, .. })) => {
                let key = OperationKey::new(service, operation, operation_id);
                let info = self.cancel_authorized(&key).await?;
                Ok(CancelOutcome::Operation { info })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_info(&self, key: &OperationKey) -> Result<OperationInfo, NexusError> {
        let descriptor = self.registry.resolve(&key.service, &key.operation)?;
        let record = self.load(key).map_err(NexusError::from)?;
        // Terminal states are always inspectable
        if !record.is_terminal() {
            descriptor.require(Capability::FetchInfo)?;
        }
        Ok(OperationInfo::from(&record))
    }

    /// Current result, optionally waiting up to `wait` for a terminal state
    pub async fn get_result(
        &self,
        key: &OperationKey,
        wait: Option<Duration>,
    ) -> Result<OperationResult, NexusError> {
        let descriptor = self.registry.resolve(&key.service, &key.operation)?;
        let mut record = self.load(key).map_err(NexusError::from)?;
        if !record.is_terminal() {
            descriptor.require(Capability::FetchResult)?;
            if let Some(wait) = wait {
                record = self
                    .wait_until(key, wait, OperationRecord::is_terminal)
                    .await
                    .map_err(NexusError::from)?;
            }
        }

        Ok(match record.outcome() {
            Some(Outcome::Succeeded { result }) => OperationResult::Succeeded { result },
            Some(Outcome::Failed { failure }) => OperationResult::Failed { failure },
            Some(Outcome::Canceled) => OperationResult::Canceled,
            None => OperationResult::StillRunning {
                state: record.state,
            },
        })
    }

    /// Final outcome reported by a handler that accepted asynchronously
    pub async fn complete(
        &self,
        key: &OperationKey,
        outcome: Outcome,
        build_id: Option<BuildId>,
    ) -> Result<OperationInfo, NexusError> {
        self.registry.resolve(&key.service, &key.operation)?;
        let record = self
            .update(key, OperationInput::AsyncCompleted { outcome, build_id })
            .await?;
        Ok(OperationInfo::from(&record))
    }

    // -------------------------------------------------------------------------
    // Worker-facing transitions
    // -------------------------------------------------------------------------

    /// Apply a worker's response to a leased task
    ///
    /// Responses that arrive after the operation moved on (redelivery, a
    /// cancel that won) are dropped.
    pub async fn record_task_response(
        &self,
        task: &Task,
        response: TaskResponse,
        build_id: Option<BuildId>,
    ) -> Result<(), LifecycleError> {
        let key = &task.operation;
        let input = match (&task.kind, response) {
            (
                TaskKind::Start { .. },
                TaskResponse::Completed {
                    outcome: Outcome::Canceled,
                },
            ) => {
                return Err(NexusError::InvalidArgument(
                    "a start task cannot complete as canceled".into(),
                )
                .into())
            }
            (TaskKind::Start { .. }, TaskResponse::Completed { outcome }) => {
                OperationInput::Completed { outcome, build_id }
            }
            (TaskKind::Start { .. }, TaskResponse::Accepted { token }) => {
                let descriptor = self.registry.resolve(&key.service, &key.operation)?;
                if matches!(descriptor.kind, HandlerKind::Sync) {
                    tracing::warn!(operation_id = %key, "synchronous handler accepted asynchronously");
                    OperationInput::Completed {
                        outcome: Outcome::Failed {
                            failure: HandlerFailure::new(
                                INVALID_HANDLER_RESPONSE,
                                "synchronous handler returned an asynchronous acceptance",
                            ),
                        },
                        build_id,
                    }
                } else {
                    OperationInput::Accepted { token, build_id }
                }
            }
            (TaskKind::Cancel { .. }, TaskResponse::CancelConfirmed) => {
                OperationInput::CancelConfirmed
            }
            (TaskKind::Cancel { .. }, TaskResponse::CancelAcknowledged) => {
                tracing::info!(operation_id = %key, "handler acknowledged cancel");
                return Ok(());
            }
            (kind, response) => {
                return Err(NexusError::InvalidArgument(format!(
                    "{} is not a valid response to a {} task",
                    response.as_str(),
                    kind.as_str()
                ))
                .into())
            }
        };

        match self.update(key, input).await {
            Ok(_) => Ok(()),
            Err(e) if is_stale(&e) => {
                tracing::info!(operation_id = %key, error = %e, "stale task response dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// A task ran out of delivery attempts
    pub async fn on_dead_letter(&self, dead: &DeadLetter) -> Result<(), LifecycleError> {
        let task = &dead.queued.task;
        if !task.is_start() {
            tracing::warn!(operation_id = %task.operation, reason = %dead.reason, "cancel task dead-lettered");
            return Ok(());
        }

        let outcome = Outcome::Failed {
            failure: HandlerFailure::new(
                DISPATCH_EXHAUSTED,
                format!(
                    "start task not completed after {} attempts: {}",
                    dead.queued.attempts, dead.reason
                ),
            ),
        };
        match self
            .update(
                &task.operation,
                OperationInput::Completed {
                    outcome,
                    build_id: None,
                },
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_stale(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Rebuild in-memory work after a restart
    ///
    /// Pending operations get their start task back (or are canceled if a
    /// cancel was waiting on them); started operations with an outstanding
    /// cancel get the cancel re-dispatched. Callbacks that were committed but
    /// never settled go back to the delivery queue.
    pub async fn recover(&self) -> Result<usize, LifecycleError> {
        let owed = self.store.pending_callbacks();
        if !owed.is_empty() {
            tracing::info!(count = owed.len(), "re-queueing unsettled callbacks");
        }
        for message in owed {
            self.executor
                .execute(Effect::DeliverCallback(message))
                .await?;
        }

        let open = self.store.operations_where(|r| !r.is_terminal());
        let mut recovered = 0;
        for record in open {
            match record.state {
                OperationState::Pending if record.cancel_requested => {
                    self.update(&record.key, OperationInput::CancelConfirmed)
                        .await?;
                }
                OperationState::Pending => {
                    self.distributor
                        .enqueue(&record.task_queue, start_task(&record));
                }
                OperationState::Started if record.cancel_requested => {
                    let Some(token) = record.async_token.clone() else {
                        continue;
                    };
                    self.executor
                        .execute(Effect::DispatchCancel {
                            key: record.key.clone(),
                            task_queue: record.task_queue.clone(),
                            token,
                            build_id: record.build_id.clone(),
                        })
                        .await?;
                }
                _ => continue,
            }
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!(recovered, "re-dispatched open operations");
        }
        Ok(recovered)
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    fn load(&self, key: &OperationKey) -> Result<OperationRecord, LifecycleError> {
        self.store
            .operation(key)
            .ok_or_else(|| NexusError::NotFound(format!("operation {}", key)).into())
    }

    /// Transition with optimistic concurrency, then run the effects
    async fn update(
        &self,
        key: &OperationKey,
        input: OperationInput,
    ) -> Result<OperationRecord, LifecycleError> {
        for _ in 0..self.config.cas_retries {
            let current = self.load(key)?;
            let (next, effects) = current.transition(input.clone(), &self.clock)?;
            if next == current {
                return Ok(current);
            }

            let dedup_expires_at = next
                .is_terminal()
                .then(|| later(self.clock.utc_now(), self.config.dedup_grace));
            let callback = effects.iter().find_map(|effect| match effect {
                Effect::DeliverCallback(message) => Some(message.clone()),
                _ => None,
            });
            let committed = self.store.commit(Mutation::OperationUpdate {
                record: next,
                expected_version: current.version,
                dedup_expires_at,
                callback,
            });

            match committed {
                Ok(Applied::Operation(record)) => {
                    tracing::info!(
                        operation_id = %key,
                        from = %current.state,
                        to = %record.state,
                        version = record.version,
                        "operation updated"
                    );
                    self.publish(&record);
                    // The write stands; a lost callback is still in the outbox
                    if let Err(e) = self.executor.execute_all(effects).await {
                        tracing::error!(operation_id = %key, error = %e, "effects failed after commit");
                    }
                    return Ok(record);
                }
                Ok(other) => {
                    tracing::error!(applied = ?other, "unexpected result for operation update");
                    return Err(NexusError::Internal.into());
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(operation_id = %key, "write conflict, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(LifecycleError::CasExhausted {
            what: key.to_string(),
            attempts: self.config.cas_retries,
        })
    }

    fn watchers(&self) -> std::sync::MutexGuard<'_, HashMap<OperationKey, watch::Sender<OperationState>>> {
        self.watchers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, record: &OperationRecord) {
        let mut watchers = self.watchers();
        if let Some(tx) = watchers.get(&record.key) {
            tx.send_replace(record.state);
        }
        if record.is_terminal() {
            watchers.remove(&record.key);
        }
    }

    fn subscribe(&self, key: &OperationKey) -> watch::Receiver<OperationState> {
        self.watchers()
            .entry(key.clone())
            .or_insert_with(|| watch::channel(OperationState::Pending).0)
            .subscribe()
    }

    fn release(&self, key: &OperationKey) {
        let mut watchers = self.watchers();
        if watchers.get(key).is_some_and(|tx| tx.receiver_count() == 0) {
            watchers.remove(key);
        }
    }

    /// Wait until `done` holds or `timeout` passes; returns the latest record
    async fn wait_until(
        &self,
        key: &OperationKey,
        timeout: Duration,
        done: impl Fn(&OperationRecord) -> bool,
    ) -> Result<OperationRecord, LifecycleError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let result = loop {
            let mut rx = self.subscribe(key);
            let record = match self.load(key) {
                Ok(record) => record,
                Err(e) => break Err(e),
            };
            if done(&record) {
                break Ok(record);
            }
            if tokio::time::timeout_at(deadline, rx.changed()).await.is_err() {
                break self.load(key);
            }
        };
        self.release(key);
        result
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
