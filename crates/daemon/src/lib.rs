// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! nxd: the Nexus daemon
//!
//! Owns the store and the engine, and serves the wire protocol on a Unix
//! socket.

pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use lifecycle::{Config, DaemonNexus, DaemonRuntime, DaemonState, LifecycleError};
pub use protocol::{CancelTarget, ProtocolError, Request, Response, PROTOCOL_VERSION};
pub use server::{ServerContext, ServerError};
