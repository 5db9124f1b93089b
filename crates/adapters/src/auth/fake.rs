// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake authorization gate for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AuthError, AuthGate, AuthRequest, AuthVerb};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct DenyRule {
    verb: Option<AuthVerb>,
    service: String,
    operation: Option<String>,
}

impl DenyRule {
    fn matches(&self, request: &AuthRequest) -> bool {
        self.service == request.service
            && self.verb.map_or(true, |v| v == request.verb)
            && match &self.operation {
                Some(op) => *op == request.operation,
                None => true,
            }
    }
}

#[derive(Default)]
struct FakeAuthState {
    rules: Vec<DenyRule>,
    calls: Vec<AuthRequest>,
}

/// Fake gate that admits everything except configured deny rules
#[derive(Clone, Default)]
pub struct FakeAuthGate {
    state: Arc<Mutex<FakeAuthState>>,
}

impl FakeAuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeAuthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deny every verb on a service
    pub fn deny_service(&self, service: &str) {
        self.lock().rules.push(DenyRule {
            verb: None,
            service: service.to_string(),
            operation: None,
        });
    }

    /// Deny one verb on one operation
    pub fn deny(&self, verb: AuthVerb, service: &str, operation: &str) {
        self.lock().rules.push(DenyRule {
            verb: Some(verb),
            service: service.to_string(),
            operation: Some(operation.to_string()),
        });
    }

    /// Get all authorization requests seen
    pub fn calls(&self) -> Vec<AuthRequest> {
        self.lock().calls.clone()
    }
}

#[async_trait]
impl AuthGate for FakeAuthGate {
    async fn authorize(&self, request: &AuthRequest) -> Result<(), AuthError> {
        let mut state = self.lock();
        state.calls.push(request.clone());
        if state.rules.iter().any(|rule| rule.matches(request)) {
            return Err(AuthError::Denied {
                verb: request.verb,
                service: request.service.clone(),
                operation: request.operation.clone(),
                reason: "denied by rule".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
