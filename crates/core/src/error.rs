// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller-facing error taxonomy

use crate::id::BuildId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure code recorded when a start task could not be delivered within its attempt budget
pub const DISPATCH_EXHAUSTED: &str = "DISPATCH_EXHAUSTED";

/// Failure code recorded when a handler replies in a way its descriptor does not allow
pub const INVALID_HANDLER_RESPONSE: &str = "INVALID_HANDLER_RESPONSE";

/// A caller-facing failure raised explicitly by a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerFailure {
    pub code: String,
    pub message: String,
}

impl HandlerFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Errors returned to callers of the core verbs
///
/// `Internal` deliberately carries no detail. The detail is logged where the
/// fault is observed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NexusError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation id {id} is already bound to a different request id")]
    AlreadyExists { id: String },

    #[error("making {version_id} compatible with {compatible_with} would create a cycle")]
    Cycle {
        version_id: BuildId,
        compatible_with: BuildId,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("handler error: {0}")]
    Handler(HandlerFailure),

    #[error("operation {0} was canceled before it started")]
    CanceledBeforeStarted(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal error")]
    Internal,
}

impl NexusError {
    /// Stable machine-readable kind, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            NexusError::NotFound(_) => "not_found",
            NexusError::AlreadyExists { .. } => "already_exists",
            NexusError::Cycle { .. } => "cycle",
            NexusError::InvalidArgument(_) => "invalid_argument",
            NexusError::Unsupported(_) => "unsupported",
            NexusError::PermissionDenied(_) => "permission_denied",
            NexusError::Handler(_) => "handler",
            NexusError::CanceledBeforeStarted(_) => "canceled_before_started",
            NexusError::Timeout => "timeout",
            NexusError::FailedPrecondition(_) => "failed_precondition",
            NexusError::Internal => "internal",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NexusError::Timeout)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
