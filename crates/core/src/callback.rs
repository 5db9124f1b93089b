// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion callback messages

use crate::error::HandlerFailure;
use crate::operation::{OperationKey, OperationRecord, OperationState};
use crate::payload::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const TOKEN_HEADER: &str = "Nexus-Callback-Token";
pub const OPERATION_ID_HEADER: &str = "Nexus-Operation-Id";

/// Where the caller wants completion delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackTarget {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl CallbackTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// One outbound completion notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackMessage {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub key: OperationKey,
    pub state: OperationState,
    pub result: Option<Payload>,
    pub failure: Option<HandlerFailure>,
    pub completed_at: DateTime<Utc>,
    /// Stable per terminal transition, so receivers can drop duplicates
    pub token: String,
}

/// JSON body posted to the callback URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackBody {
    pub service: String,
    pub operation: String,
    pub operation_id: String,
    pub state: OperationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<HandlerFailure>,
    pub token: String,
}

impl CallbackMessage {
    pub fn for_record(
        record: &OperationRecord,
        target: &CallbackTarget,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: target.url.clone(),
            headers: target.headers.clone(),
            key: record.key.clone(),
            state: record.state,
            result: record.result.clone(),
            failure: record.failure.clone(),
            completed_at,
            token: delivery_token(&record.key, record.state, completed_at),
        }
    }

    pub fn body(&self) -> CallbackBody {
        CallbackBody {
            service: self.key.service.clone(),
            operation: self.key.operation.clone(),
            operation_id: self.key.id.clone(),
            state: self.state,
            result: self.result.clone(),
            failure: self.failure.clone(),
            token: self.token.clone(),
        }
    }

    /// Caller headers plus the idempotency headers; ours win on conflict
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|(k, _)| {
                !k.eq_ignore_ascii_case(TOKEN_HEADER) && !k.eq_ignore_ascii_case(OPERATION_ID_HEADER)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.push((TOKEN_HEADER.to_string(), self.token.clone()));
        headers.push((OPERATION_ID_HEADER.to_string(), self.key.id.clone()));
        headers
    }
}

/// `hex(sha256(service/operation/id/state/completed_at))`
pub fn delivery_token(
    key: &OperationKey,
    state: OperationState,
    completed_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}/{}/{}/{}/{}",
            key.service,
            key.operation,
            key.id,
            state.as_str(),
            completed_at.to_rfc3339()
        )
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
