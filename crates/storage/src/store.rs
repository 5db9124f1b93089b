// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Strongly consistent record store
//!
//! A single lock serializes commits: each mutation is checked against the
//! current state, appended to the WAL (when durable) and only then applied.
//! Readers take the same lock briefly and receive owned copies or `Arc`
//! snapshots, so they never observe a half-applied mutation.

use crate::state::{ApplyError, Applied, MaterializedState};
use crate::wal::{Wal, WalError};
use nx_core::dedup::DedupKey;
use nx_core::{CallbackMessage, Mutation, OperationKey, OperationRecord, VersionGraph};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const WAL_FILE: &str = "wal.jsonl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl StoreError {
    /// Compare-and-swap failure; the caller should reload and retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Apply(ApplyError::Conflict { .. }))
    }
}

struct Inner {
    state: MaterializedState,
    wal: Option<Wal>,
}

pub struct Store {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
}

impl Store {
    /// Volatile store; nothing survives the process
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: MaterializedState::default(),
                wal: None,
            }),
            path: None,
        }
    }

    /// Durable store rooted at `dir`, replaying any existing log
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(WAL_FILE);
        let wal = Wal::open(&path)?;

        let mut state = MaterializedState::default();
        let mut replayed = 0usize;
        for mutation in Wal::replay(&path)? {
            match state.apply(&mutation) {
                Ok(_) => replayed += 1,
                Err(e) => {
                    tracing::warn!(mutation = mutation.name(), error = %e, "skipping WAL entry on replay")
                }
            }
        }
        tracing::info!(
            path = %path.display(),
            replayed,
            sequence = wal.sequence(),
            operations = state.operations.len(),
            "store opened"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                wal: Some(wal),
            }),
            path: Some(path),
        })
    }

    pub fn wal_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically validate, log and apply one mutation
    pub fn commit(&self, mutation: Mutation) -> Result<Applied, StoreError> {
        let mut inner = self.lock();
        inner.state.check(&mutation)?;
        if let Some(wal) = inner.wal.as_mut() {
            wal.append(&mutation)?;
        }
        Ok(inner.state.apply(&mutation)?)
    }

    pub fn operation(&self, key: &OperationKey) -> Option<OperationRecord> {
        self.lock().state.operations.get(key).cloned()
    }

    /// Operation id a request id was collapsed into, if still remembered
    pub fn dedup_entry(&self, key: &DedupKey) -> Option<String> {
        self.lock()
            .state
            .ledger
            .get(key)
            .map(|e| e.operation_id.clone())
    }

    pub fn has_cancel_marker(&self, key: &DedupKey) -> bool {
        self.lock().state.ledger.has_cancel_marker(key)
    }

    pub fn ordering(&self, task_queue: &str) -> Option<Arc<VersionGraph>> {
        self.lock().state.orderings.get(task_queue).cloned()
    }

    /// Records matching `filter`, for recovery and inspection
    pub fn operations_where(&self, filter: impl Fn(&OperationRecord) -> bool) -> Vec<OperationRecord> {
        let inner = self.lock();
        let mut records: Vec<_> = inner
            .state
            .operations
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.key.cmp(&b.key)));
        records
    }

    /// Callbacks still owed to callers, oldest completion first
    pub fn pending_callbacks(&self) -> Vec<CallbackMessage> {
        let inner = self.lock();
        let mut messages: Vec<_> = inner.state.outbox.values().cloned().collect();
        messages.sort_by(|a, b| a.completed_at.cmp(&b.completed_at).then(a.key.cmp(&b.key)));
        messages
    }

    pub fn operation_count(&self) -> usize {
        self.lock().state.operations.len()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
