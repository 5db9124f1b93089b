// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion callback transport

mod http;
mod noop;

pub use http::HttpCallbackAdapter;
pub use noop::NoOpCallbackAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{CallbackCall, FakeCallbackAdapter};

use async_trait::async_trait;
use nx_core::CallbackMessage;
use thiserror::Error;

/// Errors from callback delivery
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("invalid callback url: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to encode callback body: {0}")]
    Encode(String),
}

/// A fully rendered HTTP POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CallbackRequest {
    pub fn from_message(message: &CallbackMessage) -> Result<Self, CallbackError> {
        let body =
            serde_json::to_vec(&message.body()).map_err(|e| CallbackError::Encode(e.to_string()))?;
        let mut headers = message.request_headers();
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(Self {
            url: message.url.clone(),
            headers,
            body,
        })
    }
}

/// Adapter that posts completion notifications
///
/// Returns the HTTP status on any response; only transport failures are errors.
#[async_trait]
pub trait CallbackAdapter: Clone + Send + Sync + 'static {
    async fn post(&self, request: &CallbackRequest) -> Result<u16, CallbackError>;
}

/// True for 2xx statuses
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
