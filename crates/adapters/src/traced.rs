// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::auth::{AuthError, AuthGate, AuthRequest};
use crate::callback::{is_success, CallbackAdapter, CallbackError, CallbackRequest};
use crate::notify::{NotifyAdapter, NotifyError};
use async_trait::async_trait;

/// Wrapper that adds tracing to any CallbackAdapter
#[derive(Clone)]
pub struct TracedCallbackAdapter<C> {
    inner: C,
}

impl<C> TracedCallbackAdapter<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}

#[async_trait]
impl<C: CallbackAdapter> CallbackAdapter for TracedCallbackAdapter<C> {
    async fn post(&self, request: &CallbackRequest) -> Result<u16, CallbackError> {
        let span = tracing::info_span!("callback.post", url = %request.url);
        let _guard = span.enter();

        tracing::info!(body_len = request.body.len(), "posting");

        // Precondition: only http(s) targets are deliverable
        if !has_http_scheme(&request.url) {
            tracing::error!("callback url must be http or https");
            return Err(CallbackError::InvalidUrl(request.url.clone()));
        }

        let start = std::time::Instant::now();
        let result = self.inner.post(request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(status) if is_success(*status) => tracing::info!(
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                "callback accepted"
            ),
            Ok(status) => tracing::warn!(
                status,
                elapsed_ms = elapsed.as_millis() as u64,
                "callback rejected"
            ),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "post failed"
            ),
        }

        result
    }
}

/// Wrapper that adds tracing to any AuthGate
#[derive(Clone)]
pub struct TracedAuthGate<A> {
    inner: A,
}

impl<A> TracedAuthGate<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<A: AuthGate> AuthGate for TracedAuthGate<A> {
    async fn authorize(&self, request: &AuthRequest) -> Result<(), AuthError> {
        let span = tracing::info_span!(
            "auth.authorize",
            verb = %request.verb,
            service = %request.service,
            operation = %request.operation,
            operation_id = %request.operation_id,
        );
        let _guard = span.enter();

        let result = self.inner.authorize(request).await;
        match &result {
            Ok(()) => tracing::debug!("authorized"),
            Err(e) => tracing::warn!(error = %e, "denied"),
        }
        result
    }
}

/// Wrapper that adds tracing to any NotifyAdapter
#[derive(Clone)]
pub struct TracedNotifyAdapter<N> {
    inner: N,
}

impl<N> TracedNotifyAdapter<N> {
    pub fn new(inner: N) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<N: NotifyAdapter> NotifyAdapter for TracedNotifyAdapter<N> {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError> {
        let result = self.inner.send(channel, message).await;
        // A lost notification never blocks the caller
        if let Err(e) = &result {
            tracing::warn!(channel, error = %e, "notify failed");
        } else {
            tracing::trace!(channel, "notified");
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
