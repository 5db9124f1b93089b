// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutations for the write-ahead log
//!
//! Every change to shared durable state is one `Mutation`. Applying the same
//! sequence of mutations to an empty state always yields the same state, so
//! replay needs nothing but the log.

use crate::callback::CallbackMessage;
use crate::dedup::DedupKey;
use crate::operation::{OperationKey, OperationRecord};
use crate::version::VersionGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Bind a request id and create the operation record
    ///
    /// If a cancel marker is waiting for the request id, the record is created
    /// already canceled and the marker is consumed.
    OperationCreate {
        record: OperationRecord,
        /// Dedup expiry applied when the record is terminal on creation
        terminal_expires_at: DateTime<Utc>,
    },

    /// Replace an operation record, guarded by its version
    OperationUpdate {
        record: OperationRecord,
        expected_version: u64,
        /// Starts the dedup grace window when the update is terminal
        dedup_expires_at: Option<DateTime<Utc>>,
        /// Completion notification owed to the caller, kept until settled
        #[serde(default)]
        callback: Option<CallbackMessage>,
    },

    /// A callback was delivered or given up on; drop it from the outbox
    CallbackSettled { key: OperationKey, token: String },

    /// Remember a cancel that arrived before its Start
    CancelMarkerPut {
        key: DedupKey,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },

    /// Drop dedup entries and cancel markers whose grace window has passed
    Evict { now: DateTime<Utc> },

    /// Replace a task queue's version graph, guarded by its revision
    OrderingPut {
        graph: VersionGraph,
        expected_revision: u64,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::OperationCreate { .. } => "operation_create",
            Mutation::OperationUpdate { .. } => "operation_update",
            Mutation::CallbackSettled { .. } => "callback_settled",
            Mutation::CancelMarkerPut { .. } => "cancel_marker_put",
            Mutation::Evict { .. } => "evict",
            Mutation::OrderingPut { .. } => "ordering_put",
        }
    }
}
