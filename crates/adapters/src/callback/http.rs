// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP callback adapter backed by ureq

use super::{CallbackAdapter, CallbackError, CallbackRequest};
use async_trait::async_trait;
use std::time::Duration;

/// Posts callbacks over HTTP(S)
///
/// ureq is blocking, so each post runs on the blocking pool.
#[derive(Clone)]
pub struct HttpCallbackAdapter {
    agent: ureq::Agent,
}

impl HttpCallbackAdapter {
    pub fn new(request_timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

#[async_trait]
impl CallbackAdapter for HttpCallbackAdapter {
    async fn post(&self, request: &CallbackRequest) -> Result<u16, CallbackError> {
        let agent = self.agent.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || {
            let mut builder = agent.post(request.url.as_str());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder
                .send(&request.body[..])
                .map(|response| response.status().as_u16())
                .map_err(|e| CallbackError::Transport(e.to_string()))
        })
        .await
        .map_err(|e| CallbackError::Transport(format!("delivery task failed: {}", e)))?
    }
}
