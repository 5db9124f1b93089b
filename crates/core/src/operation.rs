// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation record and lifecycle state machine
//!
//! ```text
//! Pending ──accepted──▶ Started ──completed / async completed──▶ Succeeded | Failed | Canceled
//!    │                     │
//!    ├──completed (inline)─┼──────────────────▶ Succeeded | Failed
//!    │                     └─cancel confirmed─▶ Canceled
//!    └──cancel confirmed (never dispatched)───▶ Canceled
//! ```
//!
//! The transition function is pure. Persisting the new record and executing
//! the returned effects is the caller's job.

use crate::callback::{CallbackMessage, CallbackTarget};
use crate::clock::Clock;
use crate::effect::{Effect, Event};
use crate::error::HandlerFailure;
use crate::id::{BuildId, RequestId};
use crate::payload::Payload;
use crate::registry::HandlerKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address of one operation instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey {
    pub service: String,
    pub operation: String,
    pub id: String,
}

impl OperationKey {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.operation, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Started,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Succeeded | OperationState::Failed | OperationState::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Pending => "pending",
            OperationState::Started => "started",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
            OperationState::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final result of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Outcome {
    Succeeded { result: Payload },
    Failed { failure: HandlerFailure },
    Canceled,
}

impl Outcome {
    pub fn state(&self) -> OperationState {
        match self {
            Outcome::Succeeded { .. } => OperationState::Succeeded,
            Outcome::Failed { .. } => OperationState::Failed,
            Outcome::Canceled => OperationState::Canceled,
        }
    }
}

/// Inputs that drive an operation through its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationInput {
    /// Handler accepted the work and will finish it later
    Accepted {
        token: String,
        build_id: Option<BuildId>,
    },
    /// Handler (inline or later) produced a terminal outcome
    Completed {
        outcome: Outcome,
        build_id: Option<BuildId>,
    },
    /// Out-of-band outcome from a handler that accepted asynchronously
    AsyncCompleted {
        outcome: Outcome,
        build_id: Option<BuildId>,
    },
    /// Caller asked for cancellation
    CancelRequested,
    /// Teardown confirmed, or the start task was withdrawn before delivery
    CancelConfirmed,
}

impl OperationInput {
    fn name(&self) -> &'static str {
        match self {
            OperationInput::Accepted { .. } => "accepted",
            OperationInput::Completed { .. } => "completed",
            OperationInput::AsyncCompleted { .. } => "async_completed",
            OperationInput::CancelRequested => "cancel_requested",
            OperationInput::CancelConfirmed => "cancel_confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("operation {key} is already {state}")]
    Terminal {
        key: OperationKey,
        state: OperationState,
    },
    #[error("operation {key} cannot apply {input} while {state}")]
    Invalid {
        key: OperationKey,
        state: OperationState,
        input: &'static str,
    },
}

/// Persisted state of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub key: OperationKey,
    pub request_id: RequestId,
    pub state: OperationState,
    /// Retained in full so a cancel that raced ahead of Start needs nothing else
    pub input: Payload,
    pub callback: Option<CallbackTarget>,
    pub kind: HandlerKind,
    pub task_queue: String,
    pub async_token: Option<String>,
    /// Build that last ran a task for this operation
    pub build_id: Option<BuildId>,
    pub started_async: bool,
    pub cancel_requested: bool,
    pub canceled_before_start: bool,
    pub result: Option<Payload>,
    pub failure: Option<HandlerFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Bumped on every persisted change; the compare-and-swap token
    pub version: u64,
}

/// Fields fixed at creation time
#[derive(Debug, Clone)]
pub struct NewOperation {
    pub key: OperationKey,
    pub request_id: RequestId,
    pub input: Payload,
    pub callback: Option<CallbackTarget>,
    pub kind: HandlerKind,
    pub task_queue: String,
}

impl OperationRecord {
    pub fn new(new: NewOperation, now: DateTime<Utc>) -> Self {
        Self {
            key: new.key,
            request_id: new.request_id,
            state: OperationState::Pending,
            input: new.input,
            callback: new.callback,
            kind: new.kind,
            task_queue: new.task_queue,
            async_token: None,
            build_id: None,
            started_async: false,
            cancel_requested: false,
            canceled_before_start: false,
            result: None,
            failure: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            version: 0,
        }
    }

    /// A record that is terminal from birth: a cancel was waiting for it
    pub fn canceled_before_start(new: NewOperation, now: DateTime<Utc>) -> Self {
        Self::new(new, now).into_canceled_before_start()
    }

    /// Turn a fresh pending record into one that never starts
    pub fn into_canceled_before_start(mut self) -> Self {
        self.state = OperationState::Canceled;
        self.cancel_requested = true;
        self.canceled_before_start = true;
        self.completed_at = Some(self.created_at);
        self.updated_at = self.created_at;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Terminal outcome, if any
    pub fn outcome(&self) -> Option<Outcome> {
        match self.state {
            OperationState::Succeeded => Some(Outcome::Succeeded {
                result: self.result.clone().unwrap_or_default(),
            }),
            OperationState::Failed => Some(Outcome::Failed {
                failure: self
                    .failure
                    .clone()
                    .unwrap_or_else(|| HandlerFailure::new("UNKNOWN", "no failure recorded")),
            }),
            OperationState::Canceled => Some(Outcome::Canceled),
            OperationState::Pending | OperationState::Started => None,
        }
    }

    /// Pure transition function - returns the next record and effects
    pub fn transition(
        &self,
        input: OperationInput,
        clock: &impl Clock,
    ) -> Result<(OperationRecord, Vec<Effect>), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal {
                key: self.key.clone(),
                state: self.state,
            });
        }

        let now = clock.utc_now();
        let mut next = OperationRecord {
            updated_at: now,
            ..self.clone()
        };

        match (self.state, input) {
            (OperationState::Pending, OperationInput::Accepted { token, build_id }) => {
                next.state = OperationState::Started;
                next.started_async = true;
                next.async_token = Some(token.clone());
                if build_id.is_some() {
                    next.build_id = build_id;
                }

                let mut effects = vec![Effect::Emit(Event::OperationStarted {
                    key: self.key.clone(),
                    build_id: next.build_id.clone(),
                })];
                // A cancel arrived while the handler was still deciding
                if next.cancel_requested {
                    effects.push(Effect::DispatchCancel {
                        key: self.key.clone(),
                        task_queue: self.task_queue.clone(),
                        token,
                        build_id: next.build_id.clone(),
                    });
                }
                Ok((next, effects))
            }

            // Cancellation needs a handler that accepted, or a confirmed withdrawal
            (
                OperationState::Pending,
                input @ OperationInput::Completed {
                    outcome: Outcome::Canceled,
                    ..
                },
            ) => Err(TransitionError::Invalid {
                key: self.key.clone(),
                state: OperationState::Pending,
                input: input.name(),
            }),

            (_, OperationInput::Completed { outcome, build_id })
            | (OperationState::Started, OperationInput::AsyncCompleted { outcome, build_id }) => {
                if build_id.is_some() {
                    next.build_id = build_id;
                }
                Ok(next.finish(outcome, now))
            }

            (_, OperationInput::CancelRequested) => {
                if self.cancel_requested {
                    return Ok((self.clone(), vec![]));
                }
                next.cancel_requested = true;
                let mut effects = vec![Effect::Emit(Event::OperationCancelRequested {
                    key: self.key.clone(),
                })];
                if let (OperationState::Started, Some(token)) = (self.state, &self.async_token) {
                    effects.push(Effect::DispatchCancel {
                        key: self.key.clone(),
                        task_queue: self.task_queue.clone(),
                        token: token.clone(),
                        build_id: self.build_id.clone(),
                    });
                }
                Ok((next, effects))
            }

            (state, OperationInput::CancelConfirmed) => {
                if state == OperationState::Pending {
                    next.canceled_before_start = true;
                }
                next.cancel_requested = true;
                Ok(next.finish(Outcome::Canceled, now))
            }

            (state, input) => Err(TransitionError::Invalid {
                key: self.key.clone(),
                state,
                input: input.name(),
            }),
        }
    }

    fn finish(mut self, outcome: Outcome, now: DateTime<Utc>) -> (OperationRecord, Vec<Effect>) {
        self.state = outcome.state();
        self.completed_at = Some(now);
        match outcome {
            Outcome::Succeeded { result } => self.result = Some(result),
            Outcome::Failed { failure } => self.failure = Some(failure),
            Outcome::Canceled => {}
        }

        let mut effects = vec![Effect::Emit(Event::OperationCompleted {
            key: self.key.clone(),
            state: self.state,
        })];
        // Inline results reach the caller directly; only async work is called back
        if self.started_async {
            if let Some(target) = &self.callback {
                effects.push(Effect::DeliverCallback(CallbackMessage::for_record(
                    &self, target, now,
                )));
            }
        }
        (self, effects)
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
