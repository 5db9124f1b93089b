// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gate that admits every request.

use super::{AuthError, AuthGate, AuthRequest};
use async_trait::async_trait;

/// Used when authorization is handled upstream of the daemon.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAllGate;

impl AllowAllGate {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuthGate for AllowAllGate {
    async fn authorize(&self, _request: &AuthRequest) -> Result<(), AuthError> {
        Ok(())
    }
}
