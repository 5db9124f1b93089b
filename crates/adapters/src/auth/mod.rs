// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization gate consulted before Start and Cancel dispatch

mod allow;

pub use allow::AllowAllGate;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAuthGate;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Which verb is being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthVerb {
    Start,
    Cancel,
}

impl AuthVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthVerb::Start => "start",
            AuthVerb::Cancel => "cancel",
        }
    }
}

impl fmt::Display for AuthVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub verb: AuthVerb,
    pub service: String,
    pub operation: String,
    pub operation_id: String,
}

impl AuthRequest {
    pub fn new(
        verb: AuthVerb,
        service: impl Into<String>,
        operation: impl Into<String>,
        operation_id: impl Into<String>,
    ) -> Self {
        Self {
            verb,
            service: service.into(),
            operation: operation.into(),
            operation_id: operation_id.into(),
        }
    }
}

/// Errors from authorization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{verb} denied for {service}/{operation}: {reason}")]
    Denied {
        verb: AuthVerb,
        service: String,
        operation: String,
        reason: String,
    },
    #[error("authorization unavailable: {0}")]
    Unavailable(String),
}

/// Pass/fail gate with no state of its own
#[async_trait]
pub trait AuthGate: Clone + Send + Sync + 'static {
    async fn authorize(&self, request: &AuthRequest) -> Result<(), AuthError>;
}
