// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification adapter that writes to the daemon log.

use super::{NotifyAdapter, NotifyError};
use async_trait::async_trait;

/// Logs each notification at warn level under its channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifyAdapter;

impl LogNotifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifyAdapter for LogNotifyAdapter {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError> {
        tracing::warn!(channel, "{}", message);
        Ok(())
    }
}
