// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op callback adapter for deployments without outbound HTTP.

use super::{CallbackAdapter, CallbackError, CallbackRequest};
use async_trait::async_trait;

/// Callback adapter that accepts everything and sends nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpCallbackAdapter;

impl NoOpCallbackAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CallbackAdapter for NoOpCallbackAdapter {
    async fn post(&self, _request: &CallbackRequest) -> Result<u16, CallbackError> {
        Ok(204)
    }
}
