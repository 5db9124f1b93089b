// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nx-core: pure domain for the Nexus operation router
//!
//! This crate provides:
//! - The operation record and its lifecycle state machine
//! - The handler registry and deduplication ledger
//! - The per-task-queue version compatibility graph
//! - The task sub-queue (lease) state machine
//! - Effects, events, store mutations and configuration types
//!
//! Nothing here performs I/O.

pub mod callback;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod effect;
pub mod error;
pub mod id;
pub mod mutation;
pub mod operation;
pub mod payload;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod task;
pub mod traced;
pub mod version;

pub use callback::{CallbackBody, CallbackMessage, CallbackTarget};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, NexusConfig};
pub use dedup::{BeginOrJoin, CancelMarker, DedupKey, DedupLedger};
pub use effect::{Effect, Event};
pub use error::{HandlerFailure, NexusError};
pub use id::{BuildId, IdGen, LeaseId, RequestId, SequentialIdGen, TaskId, UuidIdGen};
pub use mutation::Mutation;
pub use operation::{
    NewOperation, OperationInput, OperationKey, OperationRecord, OperationState, Outcome,
};
pub use payload::{JsonPayloadConverter, Payload, PayloadConverter};
pub use queue::{DeadLetter, Lease, QueueEvent, QueuedTask, TaskQueue};
pub use registry::{AsyncCapabilities, Capability, HandlerDescriptor, HandlerKind, Registry};
pub use retry::{Backoff, RetryDecision};
pub use task::{cancel_task_id, start_task_id, Task, TaskKind, TaskLease, TaskResponse};
pub use traced::TracedEffect;
pub use version::{DispatchTarget, OrderingView, SetOrdering, VersionGraph, VersionType};
