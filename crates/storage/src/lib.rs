// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable record store: write-ahead log plus materialized state

mod state;
mod store;
mod wal;

pub use state::{ApplyError, Applied, MaterializedState};
pub use store::{Store, StoreError, WAL_FILE};
pub use wal::{Wal, WalEntry, WalError};
