// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

use nx_core::dedup::{CancelMarker, DedupKey, DedupLedger};
use nx_core::{CallbackMessage, Mutation, OperationKey, OperationRecord, VersionGraph};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a mutation was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("request {key} is already bound to operation {operation_id}")]
    DuplicateRequest { key: DedupKey, operation_id: String },
    #[error("operation id {0} is already bound to a different request id")]
    IdInUse(OperationKey),
    #[error("operation {0} not found")]
    NotFound(OperationKey),
    #[error("request {key} already started as operation {operation_id}")]
    AlreadyStarted { key: DedupKey, operation_id: String },
    #[error("version conflict on {what}: expected {expected}, found {found}")]
    Conflict {
        what: String,
        expected: u64,
        found: u64,
    },
}

/// What a successful mutation produced
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Operation(OperationRecord),
    CancelMarker { created: bool },
    CallbackSettled { removed: bool },
    Evicted(usize),
    Ordering(Arc<VersionGraph>),
}

/// Materialized state built from WAL mutations
#[derive(Debug, Default, Clone)]
pub struct MaterializedState {
    pub operations: HashMap<OperationKey, OperationRecord>,
    pub ledger: DedupLedger,
    pub orderings: HashMap<String, Arc<VersionGraph>>,
    /// Callbacks committed with a terminal update and not yet settled
    pub outbox: HashMap<OperationKey, CallbackMessage>,
}

fn dedup_key(record: &OperationRecord) -> DedupKey {
    DedupKey::new(
        record.key.service.clone(),
        record.key.operation.clone(),
        record.request_id.clone(),
    )
}

impl MaterializedState {
    /// Validate a mutation against current state without changing anything
    pub fn check(&self, mutation: &Mutation) -> Result<(), ApplyError> {
        match mutation {
            Mutation::OperationCreate { record, .. } => {
                let key = dedup_key(record);
                if let Some(entry) = self.ledger.get(&key) {
                    return Err(ApplyError::DuplicateRequest {
                        key,
                        operation_id: entry.operation_id.clone(),
                    });
                }
                if let Some(existing) = self.operations.get(&record.key) {
                    // Dedup entry evicted, but this is still the same request
                    if existing.request_id == record.request_id {
                        return Err(ApplyError::DuplicateRequest {
                            key,
                            operation_id: existing.key.id.clone(),
                        });
                    }
                    return Err(ApplyError::IdInUse(record.key.clone()));
                }
                Ok(())
            }

            Mutation::OperationUpdate {
                record,
                expected_version,
                ..
            } => {
                let current = self
                    .operations
                    .get(&record.key)
                    .ok_or_else(|| ApplyError::NotFound(record.key.clone()))?;
                if current.version != *expected_version {
                    return Err(ApplyError::Conflict {
                        what: format!("operation {}", record.key),
                        expected: *expected_version,
                        found: current.version,
                    });
                }
                Ok(())
            }

            Mutation::CancelMarkerPut { key, .. } => match self.ledger.get(key) {
                Some(entry) => Err(ApplyError::AlreadyStarted {
                    key: key.clone(),
                    operation_id: entry.operation_id.clone(),
                }),
                None => Ok(()),
            },

            Mutation::CallbackSettled { .. } | Mutation::Evict { .. } => Ok(()),

            Mutation::OrderingPut {
                graph,
                expected_revision,
            } => {
                let found = self
                    .orderings
                    .get(graph.task_queue())
                    .map(|g| g.revision())
                    .unwrap_or(0);
                if found != *expected_revision {
                    return Err(ApplyError::Conflict {
                        what: format!("ordering of {}", graph.task_queue()),
                        expected: *expected_revision,
                        found,
                    });
                }
                Ok(())
            }
        }
    }

    /// Apply a mutation to update the state
    pub fn apply(&mut self, mutation: &Mutation) -> Result<Applied, ApplyError> {
        self.check(mutation)?;

        match mutation {
            Mutation::OperationCreate {
                record,
                terminal_expires_at,
            } => {
                let key = dedup_key(record);
                self.ledger.begin_or_join(&key, &record.key.id);

                let mut record = record.clone();
                if self.ledger.take_cancel_marker(&key).is_some() {
                    record = record.into_canceled_before_start();
                }
                if record.is_terminal() {
                    self.ledger.expire_at(&key, *terminal_expires_at);
                }
                record.version = 1;
                self.operations.insert(record.key.clone(), record.clone());
                Ok(Applied::Operation(record))
            }

            Mutation::OperationUpdate {
                record,
                expected_version,
                dedup_expires_at,
                callback,
            } => {
                let mut record = record.clone();
                record.version = expected_version + 1;
                if let Some(at) = dedup_expires_at {
                    self.ledger.expire_at(&dedup_key(&record), *at);
                }
                if let Some(message) = callback {
                    self.outbox.insert(record.key.clone(), message.clone());
                }
                self.operations.insert(record.key.clone(), record.clone());
                Ok(Applied::Operation(record))
            }

            Mutation::CancelMarkerPut {
                key,
                created_at,
                expires_at,
            } => {
                let created = self.ledger.put_cancel_marker(
                    key,
                    CancelMarker {
                        created_at: *created_at,
                        expires_at: *expires_at,
                    },
                );
                Ok(Applied::CancelMarker { created })
            }

            Mutation::CallbackSettled { key, token } => {
                let removed = match self.outbox.get(key) {
                    Some(message) if &message.token == token => {
                        self.outbox.remove(key);
                        true
                    }
                    _ => false,
                };
                Ok(Applied::CallbackSettled { removed })
            }

            Mutation::Evict { now } => Ok(Applied::Evicted(self.ledger.evict_expired(*now))),

            Mutation::OrderingPut { graph, .. } => {
                let graph = Arc::new(graph.clone());
                self.orderings
                    .insert(graph.task_queue().to_string(), Arc::clone(&graph));
                Ok(Applied::Ordering(graph))
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
