// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker version compatibility

mod graph;

pub use graph::{
    DispatchTarget, NodeView, OrderingView, SetOrdering, VersionError, VersionGraph, VersionNode,
    VersionType,
};
