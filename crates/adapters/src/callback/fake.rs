// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake callback adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{CallbackAdapter, CallbackError, CallbackRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Recorded callback post
#[derive(Debug, Clone)]
pub struct CallbackCall {
    pub request: CallbackRequest,
    pub result: Result<u16, CallbackError>,
}

impl CallbackCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.request.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<CallbackCall>,
    script: VecDeque<Result<u16, CallbackError>>,
    default_status: Option<u16>,
}

/// Fake callback adapter with scripted responses
///
/// Scripted results are consumed in order; once exhausted every post gets the
/// default status (200 unless changed).
#[derive(Clone, Default)]
pub struct FakeCallbackAdapter {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCallbackAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a status for the next unanswered post
    pub fn respond_with(&self, status: u16) -> &Self {
        self.lock().script.push_back(Ok(status));
        self
    }

    /// Queue a transport failure for the next unanswered post
    pub fn fail_with(&self, reason: &str) -> &Self {
        self.lock()
            .script
            .push_back(Err(CallbackError::Transport(reason.to_string())));
        self
    }

    pub fn set_default_status(&self, status: u16) {
        self.lock().default_status = Some(status);
    }

    /// Get all recorded posts
    pub fn calls(&self) -> Vec<CallbackCall> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl CallbackAdapter for FakeCallbackAdapter {
    async fn post(&self, request: &CallbackRequest) -> Result<u16, CallbackError> {
        let mut state = self.lock();
        let result = match state.script.pop_front() {
            Some(result) => result,
            None => Ok(state.default_status.unwrap_or(200)),
        };
        state.calls.push(CallbackCall {
            request: request.clone(),
            result: result.clone(),
        });
        result
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
