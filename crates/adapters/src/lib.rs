// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O

pub mod auth;
pub mod callback;
pub mod notify;
pub mod traced;

pub use auth::{AllowAllGate, AuthError, AuthGate, AuthRequest, AuthVerb};
pub use callback::{
    is_success, CallbackAdapter, CallbackError, CallbackRequest, HttpCallbackAdapter,
    NoOpCallbackAdapter,
};
pub use notify::{LogNotifyAdapter, NoOpNotifyAdapter, NotifyAdapter, NotifyError};
pub use traced::{TracedAuthGate, TracedCallbackAdapter, TracedNotifyAdapter};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use auth::FakeAuthGate;
#[cfg(any(test, feature = "test-support"))]
pub use callback::{CallbackCall, FakeCallbackAdapter};
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
