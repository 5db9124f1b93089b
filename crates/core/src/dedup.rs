// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deduplication ledger
//!
//! Maps `(service, operation, request_id)` to the operation id a Start was
//! collapsed into, and holds cancel markers for requests whose Start has not
//! arrived yet. The ledger is plain data; atomicity comes from the store that
//! owns it, which checks and applies each change under one lock.

use crate::id::RequestId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub service: String,
    pub operation: String,
    pub request_id: RequestId,
}

impl DedupKey {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        request_id: impl Into<RequestId>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            request_id: request_id.into(),
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.service, self.operation, self.request_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    pub operation_id: String,
    /// Set once the operation is terminal; evictable after this instant
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelMarker {
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of `begin_or_join`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOrJoin {
    /// No entry existed; the caller's id is now bound
    Created { operation_id: String },
    /// A Start with this request id was already seen
    Joined { operation_id: String },
}

impl BeginOrJoin {
    pub fn operation_id(&self) -> &str {
        match self {
            BeginOrJoin::Created { operation_id } | BeginOrJoin::Joined { operation_id } => {
                operation_id
            }
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, BeginOrJoin::Created { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupLedger {
    entries: BTreeMap<DedupKey, DedupEntry>,
    markers: BTreeMap<DedupKey, CancelMarker>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &DedupKey) -> Option<&DedupEntry> {
        self.entries.get(key)
    }

    /// Check-and-insert. Must run under the owner's write lock.
    pub fn begin_or_join(&mut self, key: &DedupKey, new_id_if_absent: &str) -> BeginOrJoin {
        if let Some(entry) = self.entries.get(key) {
            return BeginOrJoin::Joined {
                operation_id: entry.operation_id.clone(),
            };
        }
        self.entries.insert(
            key.clone(),
            DedupEntry {
                operation_id: new_id_if_absent.to_string(),
                expires_at: None,
            },
        );
        BeginOrJoin::Created {
            operation_id: new_id_if_absent.to_string(),
        }
    }

    /// Start the grace window for an entry whose operation reached a terminal state
    pub fn expire_at(&mut self, key: &DedupKey, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(at);
        }
    }

    /// Record a cancel that arrived before its Start. Returns false if one was already held.
    pub fn put_cancel_marker(&mut self, key: &DedupKey, marker: CancelMarker) -> bool {
        if self.markers.contains_key(key) {
            return false;
        }
        self.markers.insert(key.clone(), marker);
        true
    }

    pub fn has_cancel_marker(&self, key: &DedupKey) -> bool {
        self.markers.contains_key(key)
    }

    pub fn take_cancel_marker(&mut self, key: &DedupKey) -> Option<CancelMarker> {
        self.markers.remove(key)
    }

    /// Drop entries and markers whose grace window has passed
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len() + self.markers.len();
        self.entries
            .retain(|_, e| e.expires_at.map(|at| at > now).unwrap_or(true));
        self.markers.retain(|_, m| m.expires_at > now);
        before - (self.entries.len() + self.markers.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
