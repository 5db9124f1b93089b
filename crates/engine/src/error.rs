// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use nx_adapters::{AuthError, NotifyError};
use nx_core::operation::TransitionError;
use nx_core::version::VersionError;
use nx_core::NexusError;
use nx_storage::{ApplyError, StoreError};
use thiserror::Error;

/// Errors from effect execution and background loops
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),
    #[error("delivery queue closed")]
    DeliveryClosed,
}

/// Errors inside the lifecycle engine, before they reach a caller
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Nexus(#[from] NexusError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid transition: {0}")]
    Transition(#[from] TransitionError),
    #[error("version graph error: {0}")]
    Version(#[from] VersionError),
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("gave up on {what} after {attempts} conflicting writes")]
    CasExhausted { what: String, attempts: u32 },
}

impl From<LifecycleError> for NexusError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Nexus(e) => e,
            LifecycleError::Version(e) => e.into(),
            LifecycleError::Auth(AuthError::Denied { .. }) => {
                NexusError::PermissionDenied(err.to_string())
            }
            LifecycleError::Store(StoreError::Apply(ApplyError::NotFound(key))) => {
                NexusError::NotFound(format!("operation {}", key))
            }
            LifecycleError::Store(StoreError::Apply(ApplyError::IdInUse(key))) => {
                NexusError::AlreadyExists { id: key.id }
            }
            LifecycleError::Transition(TransitionError::Terminal { key, state }) => {
                NexusError::FailedPrecondition(format!("operation {} is already {}", key, state))
            }
            LifecycleError::Transition(e @ TransitionError::Invalid { .. }) => {
                NexusError::FailedPrecondition(e.to_string())
            }
            other => {
                // Details stay in the log
                tracing::error!(error = %other, "internal error");
                NexusError::Internal
            }
        }
    }
}
