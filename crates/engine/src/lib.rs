// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Nexus operation engine
//!
//! Drives operations through their lifecycle on top of the store, routes
//! tasks to versioned sub-queues and delivers completion callbacks.

mod delivery;
mod distribution;
mod error;
mod events;
mod executor;
mod lifecycle;
mod runtime;
mod versioning;
mod worker;

pub use delivery::{DeliveryFailure, DeliveryFailures, DeliveryReport, DeliveryWorker};
pub use distribution::{PollOutcome, QueueStats, TaskDistributor};
pub use error::{EngineError, LifecycleError};
pub use events::EventBus;
pub use executor::Executor;
pub use lifecycle::{
    CancelOutcome, LifecycleEngine, OperationInfo, OperationResult, StartRequest, StartResponse,
};
pub use runtime::{Nexus, NexusDeps, NexusStatus, Runtime, RuntimeDeps, RuntimeError};
pub use versioning::VersionService;
pub use worker::{HandlerSet, OperationHandler, StartTask, Worker};
