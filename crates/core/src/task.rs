// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatched units of work

use crate::callback::CallbackTarget;
use crate::id::{BuildId, LeaseId, RequestId, TaskId};
use crate::operation::{OperationKey, Outcome};
use crate::payload::Payload;
use crate::version::DispatchTarget;
use serde::{Deserialize, Serialize};

/// What the worker is asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TaskKind {
    Start {
        request_id: RequestId,
        input: Payload,
        #[serde(default)]
        callback: Option<CallbackTarget>,
    },
    Cancel {
        token: String,
    },
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Start { .. } => "start",
            TaskKind::Cancel { .. } => "cancel",
        }
    }
}

/// One unit of work on a task queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub operation: OperationKey,
    pub kind: TaskKind,
    /// Build that previously ran work for this operation, if any
    pub originating_version: Option<BuildId>,
}

impl Task {
    pub fn start(
        id: impl Into<TaskId>,
        operation: OperationKey,
        request_id: RequestId,
        input: Payload,
        callback: Option<CallbackTarget>,
    ) -> Self {
        Self {
            id: id.into(),
            operation,
            kind: TaskKind::Start {
                request_id,
                input,
                callback,
            },
            originating_version: None,
        }
    }

    pub fn cancel(
        id: impl Into<TaskId>,
        operation: OperationKey,
        token: impl Into<String>,
        originating_version: Option<BuildId>,
    ) -> Self {
        Self {
            id: id.into(),
            operation,
            kind: TaskKind::Cancel {
                token: token.into(),
            },
            originating_version,
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, TaskKind::Start { .. })
    }

    /// Cancels jump ahead of starts so teardown is not starved by new work
    pub fn priority(&self) -> i32 {
        match self.kind {
            TaskKind::Start { .. } => 0,
            TaskKind::Cancel { .. } => 10,
        }
    }
}

/// A task handed to one poller, valid until acked or its lease expires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLease {
    pub lease_id: LeaseId,
    pub task_queue: String,
    pub target: DispatchTarget,
    /// 1 on first delivery
    pub attempt: u32,
    pub task: Task,
}

/// What a worker reports after running a leased task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "response")]
pub enum TaskResponse {
    /// Start task finished inline
    Completed { outcome: Outcome },
    /// Start task accepted; the handler finishes later through Complete
    Accepted { token: String },
    /// Cancel task: teardown done, the operation is canceled
    CancelConfirmed,
    /// Cancel task: signal received, the operation runs to its own end
    CancelAcknowledged,
}

impl TaskResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskResponse::Completed { .. } => "completed",
            TaskResponse::Accepted { .. } => "accepted",
            TaskResponse::CancelConfirmed => "cancel_confirmed",
            TaskResponse::CancelAcknowledged => "cancel_acknowledged",
        }
    }
}

/// Deterministic id of an operation's start task, so it can be withdrawn by key
pub fn start_task_id(key: &OperationKey) -> TaskId {
    TaskId(format!("start:{}", key))
}

pub fn cancel_task_id(key: &OperationKey) -> TaskId {
    TaskId(format!("cancel:{}", key))
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
