// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task-queue compatibility graph
//!
//! Nodes live in an append-only arena and refer to each other by index.
//! Edits are applied to a clone and returned whole, so a rejected edit never
//! leaves a partially updated graph behind and readers holding the previous
//! value keep a consistent snapshot.

use crate::effect::{Effect, Event};
use crate::error::NexusError;
use crate::id::BuildId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    #[default]
    WorkerBuild,
    WorkflowBundle,
}

impl std::fmt::Display for VersionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionType::WorkerBuild => f.write_str("worker_build"),
            VersionType::WorkflowBundle => f.write_str("workflow_bundle"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionNode {
    pub build_id: BuildId,
    pub version_type: VersionType,
    pub compatible_with: Option<usize>,
    pub previous_incompatible: Option<usize>,
    pub compatible_successor: Option<usize>,
    pub is_default: bool,
}

/// A `SetOrdering` edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetOrdering {
    pub version_id: BuildId,
    #[serde(default)]
    pub version_type: VersionType,
    #[serde(default)]
    pub compatible_with: Option<BuildId>,
    #[serde(default)]
    pub make_default: bool,
}

impl SetOrdering {
    pub fn new(version_id: impl Into<BuildId>) -> Self {
        Self {
            version_id: version_id.into(),
            version_type: VersionType::WorkerBuild,
            compatible_with: None,
            make_default: false,
        }
    }

    pub fn compatible_with(mut self, build_id: impl Into<BuildId>) -> Self {
        self.compatible_with = Some(build_id.into());
        self
    }

    pub fn make_default(mut self) -> Self {
        self.make_default = true;
        self
    }

    pub fn of_type(mut self, version_type: VersionType) -> Self {
        self.version_type = version_type;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("build id {build_id} not found in task queue {task_queue}")]
    NotFound {
        task_queue: String,
        build_id: BuildId,
    },
    #[error("making {version_id} compatible with {compatible_with} would create a cycle")]
    Cycle {
        version_id: BuildId,
        compatible_with: BuildId,
    },
    #[error("{0}")]
    Invalid(String),
}

impl From<VersionError> for NexusError {
    fn from(err: VersionError) -> Self {
        match err {
            VersionError::NotFound { .. } => NexusError::NotFound(err.to_string()),
            VersionError::Cycle {
                version_id,
                compatible_with,
            } => NexusError::Cycle {
                version_id,
                compatible_with,
            },
            VersionError::Invalid(msg) => NexusError::InvalidArgument(msg),
        }
    }
}

/// Sub-queue a unit of work is routed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTarget {
    Build(BuildId),
    /// No default exists yet; served by workers that have not opted into versioning
    Unversioned,
}

impl std::fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchTarget::Build(b) => write!(f, "build:{}", b),
            DispatchTarget::Unversioned => f.write_str("unversioned"),
        }
    }
}

/// Read-only view of a node, with neighbours resolved to build ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub build_id: BuildId,
    pub version_type: VersionType,
    pub is_default: bool,
    pub compatible_with: Option<BuildId>,
    pub previous_incompatible: Option<BuildId>,
    pub compatible_successor: Option<BuildId>,
}

/// Result of `GetOrdering`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingView {
    pub task_queue: String,
    pub revision: u64,
    pub default_revision: u64,
    pub current_defaults: Vec<NodeView>,
    pub compatible_leaves: Vec<NodeView>,
}

/// Serialized form; the lookup index is rebuilt on load
#[derive(Serialize, Deserialize)]
struct GraphRecord {
    task_queue: String,
    revision: u64,
    default_revision: u64,
    max_depth: usize,
    nodes: Vec<VersionNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GraphRecord", into = "GraphRecord")]
pub struct VersionGraph {
    task_queue: String,
    /// Bumped on every accepted edit; the compare-and-swap token
    revision: u64,
    /// Bumped each time a default moves
    default_revision: u64,
    max_depth: usize,
    nodes: Vec<VersionNode>,
    index: BTreeMap<BuildId, usize>,
    worker_default: Option<usize>,
    bundle_default: Option<usize>,
}

impl From<GraphRecord> for VersionGraph {
    fn from(record: GraphRecord) -> Self {
        let mut graph = VersionGraph::new(record.task_queue, record.max_depth);
        graph.revision = record.revision;
        graph.default_revision = record.default_revision;
        for (i, node) in record.nodes.iter().enumerate() {
            graph.index.insert(node.build_id.clone(), i);
            if node.is_default {
                *graph.default_slot(node.version_type) = Some(i);
            }
        }
        graph.nodes = record.nodes;
        graph
    }
}

impl From<VersionGraph> for GraphRecord {
    fn from(graph: VersionGraph) -> Self {
        GraphRecord {
            task_queue: graph.task_queue,
            revision: graph.revision,
            default_revision: graph.default_revision,
            max_depth: graph.max_depth,
            nodes: graph.nodes,
        }
    }
}

impl VersionGraph {
    pub fn new(task_queue: impl Into<String>, max_depth: usize) -> Self {
        Self {
            task_queue: task_queue.into(),
            revision: 0,
            default_revision: 0,
            max_depth: max_depth.max(1),
            nodes: Vec::new(),
            index: BTreeMap::new(),
            worker_default: None,
            bundle_default: None,
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn default_revision(&self) -> u64 {
        self.default_revision
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn nodes(&self) -> &[VersionNode] {
        &self.nodes
    }

    pub fn node(&self, build_id: &BuildId) -> Option<&VersionNode> {
        self.index.get(build_id).map(|&i| &self.nodes[i])
    }

    pub fn default_for(&self, version_type: VersionType) -> Option<&BuildId> {
        let slot = match version_type {
            VersionType::WorkerBuild => self.worker_default,
            VersionType::WorkflowBundle => self.bundle_default,
        };
        slot.map(|i| &self.nodes[i].build_id)
    }

    fn default_slot(&mut self, version_type: VersionType) -> &mut Option<usize> {
        match version_type {
            VersionType::WorkerBuild => &mut self.worker_default,
            VersionType::WorkflowBundle => &mut self.bundle_default,
        }
    }

    /// Apply an edit, returning the new graph or rejecting the edit whole
    pub fn set_ordering(
        &self,
        request: &SetOrdering,
    ) -> Result<(VersionGraph, Vec<Effect>), VersionError> {
        if request.version_id.as_str().is_empty() {
            return Err(VersionError::Invalid("version id must not be empty".into()));
        }

        let target = match &request.compatible_with {
            Some(c) if c == &request.version_id => {
                return Err(VersionError::Cycle {
                    version_id: request.version_id.clone(),
                    compatible_with: c.clone(),
                })
            }
            Some(c) => Some(*self.index.get(c).ok_or_else(|| VersionError::NotFound {
                task_queue: self.task_queue.clone(),
                build_id: c.clone(),
            })?),
            None => None,
        };

        let mut next = self.clone();
        let mut effects = Vec::new();

        let node = match next.index.get(&request.version_id) {
            Some(&i) => {
                let existing = next.nodes[i].version_type;
                if existing != request.version_type {
                    return Err(VersionError::Invalid(format!(
                        "{} is a {}, not a {}",
                        request.version_id, existing, request.version_type
                    )));
                }
                i
            }
            None => {
                let i = next.nodes.len();
                next.nodes.push(VersionNode {
                    build_id: request.version_id.clone(),
                    version_type: request.version_type,
                    compatible_with: None,
                    previous_incompatible: None,
                    compatible_successor: None,
                    is_default: false,
                });
                next.index.insert(request.version_id.clone(), i);
                effects.push(Effect::Emit(Event::VersionAdded {
                    task_queue: next.task_queue.clone(),
                    build_id: request.version_id.clone(),
                    version_type: request.version_type,
                }));
                i
            }
        };

        if let Some(target) = target {
            next.attach(node, target, &mut effects)?;
        }

        let current = *next.default_slot(request.version_type);
        if (request.make_default || current.is_none()) && current != Some(node) {
            next.promote(node, current, &mut effects);
        }

        if !effects.is_empty() {
            next.revision += 1;
        }
        Ok((next, effects))
    }

    fn attach(
        &mut self,
        node: usize,
        target: usize,
        effects: &mut Vec<Effect>,
    ) -> Result<(), VersionError> {
        let version_id = self.nodes[node].build_id.clone();
        let target_id = self.nodes[target].build_id.clone();

        if self.nodes[target].version_type != self.nodes[node].version_type {
            return Err(VersionError::Invalid(format!(
                "{} and {} have different version types",
                version_id, target_id
            )));
        }

        // Walk from the target toward its root; meeting the node means a cycle
        let mut cursor = Some(target);
        let mut hops = 0;
        while let Some(i) = cursor {
            if i == node {
                return Err(VersionError::Cycle {
                    version_id,
                    compatible_with: target_id,
                });
            }
            hops += 1;
            if hops > self.nodes.len() {
                break;
            }
            cursor = self.nodes[i].compatible_with;
        }

        if let Some(successor) = self.nodes[target].compatible_successor {
            if successor != node {
                return Err(VersionError::Invalid(format!(
                    "{} already has compatible successor {}",
                    target_id, self.nodes[successor].build_id
                )));
            }
        }

        if self.nodes[node].compatible_with != Some(target) {
            if let Some(old) = self.nodes[node].compatible_with {
                self.nodes[old].compatible_successor = None;
            }
            self.nodes[node].compatible_with = Some(target);
            self.nodes[target].compatible_successor = Some(node);
            effects.push(Effect::Emit(Event::VersionCompatible {
                task_queue: self.task_queue.clone(),
                build_id: version_id.clone(),
                compatible_with: target_id,
            }));
        }

        let len = self.chain_len(node);
        if len > self.max_depth {
            return Err(VersionError::Invalid(format!(
                "compatible chain through {} would be {} long; the limit is {}",
                version_id, len, self.max_depth
            )));
        }
        Ok(())
    }

    fn promote(&mut self, node: usize, previous: Option<usize>, effects: &mut Vec<Effect>) {
        if let Some(p) = previous {
            self.nodes[p].is_default = false;
            if !self.is_ancestor(p, node) {
                self.nodes[node].previous_incompatible = Some(p);
            }
        }
        let version_type = self.nodes[node].version_type;
        self.nodes[node].is_default = true;
        *self.default_slot(version_type) = Some(node);
        self.default_revision += 1;
        effects.push(Effect::Emit(Event::VersionDefaultChanged {
            task_queue: self.task_queue.clone(),
            build_id: self.nodes[node].build_id.clone(),
            previous: previous.map(|p| self.nodes[p].build_id.clone()),
            version_type,
        }));
    }

    /// True if `ancestor` lies on the compatible chain above `node`
    fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut cursor = self.nodes[node].compatible_with;
        let mut hops = 0;
        while let Some(i) = cursor {
            if i == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.nodes.len() {
                break;
            }
            cursor = self.nodes[i].compatible_with;
        }
        false
    }

    fn root_of(&self, node: usize) -> usize {
        let mut current = node;
        for _ in 0..self.nodes.len() {
            match self.nodes[current].compatible_with {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    fn leaf_of(&self, node: usize) -> usize {
        let mut current = node;
        for _ in 0..self.nodes.len() {
            match self.nodes[current].compatible_successor {
                Some(child) => current = child,
                None => break,
            }
        }
        current
    }

    fn chain_len(&self, node: usize) -> usize {
        let mut current = self.root_of(node);
        let mut len = 1;
        while let Some(child) = self.nodes[current].compatible_successor {
            len += 1;
            current = child;
            if len > self.nodes.len() {
                break;
            }
        }
        len
    }

    /// Queue for new or continuing work
    ///
    /// Work that already ran on a known build follows that build's compatible
    /// chain to its leaf. Anything else goes to the worker-build default.
    pub fn resolve_dispatch_target(&self, originating: Option<&BuildId>) -> DispatchTarget {
        if let Some(&i) = originating.and_then(|o| self.index.get(o)) {
            return DispatchTarget::Build(self.nodes[self.leaf_of(i)].build_id.clone());
        }
        self.default_target()
    }

    /// Queue a poller is served from; unversioned pollers are pinned to the default
    pub fn poll_target(&self, build_id: Option<&BuildId>) -> DispatchTarget {
        match build_id {
            Some(b) => DispatchTarget::Build(b.clone()),
            None => self.default_target(),
        }
    }

    fn default_target(&self) -> DispatchTarget {
        match self.worker_default {
            Some(i) => DispatchTarget::Build(self.nodes[i].build_id.clone()),
            None => DispatchTarget::Unversioned,
        }
    }

    /// Defaults plus the leaves reachable within `max_depth` hops of a default
    pub fn get_ordering(&self, max_depth: usize) -> OrderingView {
        let defaults: Vec<usize> = [self.worker_default, self.bundle_default]
            .into_iter()
            .flatten()
            .collect();

        let mut seen = HashSet::new();
        let mut leaves = Vec::new();
        let mut leaf_seen = HashSet::new();
        let mut queue: VecDeque<(usize, usize)> = defaults.iter().map(|&d| (d, 0)).collect();

        while let Some((i, depth)) = queue.pop_front() {
            if !seen.insert(i) {
                continue;
            }
            let leaf = self.leaf_of(i);
            if leaf_seen.insert(leaf) {
                leaves.push(leaf);
            }
            if depth >= max_depth {
                continue;
            }
            let node = &self.nodes[i];
            for neighbour in [node.compatible_with, node.previous_incompatible]
                .into_iter()
                .flatten()
            {
                queue.push_back((neighbour, depth + 1));
            }
        }

        OrderingView {
            task_queue: self.task_queue.clone(),
            revision: self.revision,
            default_revision: self.default_revision,
            current_defaults: defaults.iter().map(|&i| self.view(i)).collect(),
            compatible_leaves: leaves.iter().map(|&i| self.view(i)).collect(),
        }
    }

    fn view(&self, i: usize) -> NodeView {
        let node = &self.nodes[i];
        let id = |slot: Option<usize>| slot.map(|j| self.nodes[j].build_id.clone());
        NodeView {
            build_id: node.build_id.clone(),
            version_type: node.version_type,
            is_default: node.is_default,
            compatible_with: id(node.compatible_with),
            previous_incompatible: id(node.previous_incompatible),
            compatible_successor: id(node.compatible_successor),
        }
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
