// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects and events for state machine orchestration

use crate::callback::CallbackMessage;
use crate::id::{BuildId, LeaseId, TaskId};
use crate::operation::{OperationKey, OperationState};
use crate::traced::TracedEffect;
use crate::version::VersionType;
use serde::{Deserialize, Serialize};

/// Effects are side effects that state machines request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Emit an event for other components to observe
    Emit(Event),
    /// Forward a cancel signal to the handler that accepted the operation
    DispatchCancel {
        key: OperationKey,
        task_queue: String,
        token: String,
        build_id: Option<BuildId>,
    },
    /// Hand a completion notification to the delivery worker
    DeliverCallback(CallbackMessage),
}

impl TracedEffect for Effect {
    fn name(&self) -> &'static str {
        match self {
            Effect::Emit(_) => "emit",
            Effect::DispatchCancel { .. } => "dispatch_cancel",
            Effect::DeliverCallback(_) => "deliver_callback",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Emit(event) => vec![("event", event.name().to_string())],
            Effect::DispatchCancel {
                key,
                task_queue,
                build_id,
                ..
            } => vec![
                ("operation_id", key.to_string()),
                ("task_queue", task_queue.clone()),
                (
                    "build_id",
                    build_id
                        .as_ref()
                        .map(|b| b.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
            ],
            Effect::DeliverCallback(message) => vec![
                ("operation_id", message.key.to_string()),
                ("state", message.state.to_string()),
                ("url", message.url.clone()),
            ],
        }
    }
}

/// Events emitted by state machines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Operation events
    OperationCreated {
        key: OperationKey,
        task_queue: String,
    },
    OperationStarted {
        key: OperationKey,
        build_id: Option<BuildId>,
    },
    OperationCancelRequested {
        key: OperationKey,
    },
    OperationCompleted {
        key: OperationKey,
        state: OperationState,
    },

    // Task events
    TaskEnqueued {
        task_queue: String,
        target: String,
        task_id: TaskId,
    },
    TaskLeased {
        task_queue: String,
        task_id: TaskId,
        lease_id: LeaseId,
        attempt: u32,
    },
    TaskAcked {
        task_queue: String,
        task_id: TaskId,
    },
    TaskRequeued {
        task_queue: String,
        task_id: TaskId,
        reason: String,
    },
    TaskDeadLettered {
        task_queue: String,
        task_id: TaskId,
        reason: String,
    },
    TaskWithdrawn {
        task_queue: String,
        task_id: TaskId,
    },

    // Version events
    VersionAdded {
        task_queue: String,
        build_id: BuildId,
        version_type: VersionType,
    },
    VersionCompatible {
        task_queue: String,
        build_id: BuildId,
        compatible_with: BuildId,
    },
    VersionDefaultChanged {
        task_queue: String,
        build_id: BuildId,
        previous: Option<BuildId>,
        version_type: VersionType,
    },

    // Callback events
    CallbackDelivered {
        key: OperationKey,
        attempts: u32,
        status: u16,
    },
    CallbackRetrying {
        key: OperationKey,
        attempt: u32,
        reason: String,
    },
    CallbackExhausted {
        key: OperationKey,
        attempts: u32,
        reason: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OperationCreated { .. } => "operation:created",
            Event::OperationStarted { .. } => "operation:started",
            Event::OperationCancelRequested { .. } => "operation:cancel_requested",
            Event::OperationCompleted { .. } => "operation:completed",

            Event::TaskEnqueued { .. } => "task:enqueued",
            Event::TaskLeased { .. } => "task:leased",
            Event::TaskAcked { .. } => "task:acked",
            Event::TaskRequeued { .. } => "task:requeued",
            Event::TaskDeadLettered { .. } => "task:deadlettered",
            Event::TaskWithdrawn { .. } => "task:withdrawn",

            Event::VersionAdded { .. } => "version:added",
            Event::VersionCompatible { .. } => "version:compatible",
            Event::VersionDefaultChanged { .. } => "version:default_changed",

            Event::CallbackDelivered { .. } => "callback:delivered",
            Event::CallbackRetrying { .. } => "callback:retrying",
            Event::CallbackExhausted { .. } => "callback:exhausted",
        }
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
