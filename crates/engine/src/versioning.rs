// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Version graph service: serialized edits per task queue via
//! compare-and-swap on the ordering's revision.

use crate::distribution::TaskDistributor;
use crate::error::LifecycleError;
use crate::executor::Executor;
use nx_core::{
    BuildId, Clock, DispatchTarget, IdGen, Mutation, NexusError, OrderingView,
    SetOrdering, VersionGraph,
};
use nx_storage::Store;
use std::sync::Arc;

pub struct VersionService<C: Clock, I: IdGen> {
    store: Arc<Store>,
    distributor: Arc<TaskDistributor<C, I>>,
    executor: Arc<Executor<C, I>>,
    max_depth: usize,
    cas_retries: u32,
}

impl<C: Clock, I: IdGen> VersionService<C, I> {
    pub fn new(
        store: Arc<Store>,
        distributor: Arc<TaskDistributor<C, I>>,
        executor: Arc<Executor<C, I>>,
        max_depth: usize,
        cas_retries: u32,
    ) -> Self {
        Self {
            store,
            distributor,
            executor,
            max_depth,
            cas_retries,
        }
    }

    fn current(&self, task_queue: &str) -> Arc<VersionGraph> {
        self.store
            .ordering(task_queue)
            .unwrap_or_else(|| Arc::new(VersionGraph::new(task_queue, self.max_depth)))
    }

    /// Insert or re-parent a node; returns the ordering's new revision
    ///
    /// Rejected edits leave the stored graph untouched.
    pub async fn set_ordering(
        &self,
        task_queue: &str,
        request: &SetOrdering,
    ) -> Result<u64, NexusError> {
        self.set_ordering_inner(task_queue, request)
            .await
            .map_err(Into::into)
    }

    async fn set_ordering_inner(
        &self,
        task_queue: &str,
        request: &SetOrdering,
    ) -> Result<u64, LifecycleError> {
        if task_queue.is_empty() {
            return Err(NexusError::InvalidArgument("task queue is required".into()).into());
        }

        for _ in 0..self.cas_retries {
            let current = self.current(task_queue);
            let (next, effects) = match current.set_ordering(request) {
                Ok(applied) => applied,
                Err(e) => {
                    tracing::info!(task_queue, build_id = %request.version_id, error = %e, "ordering edit rejected");
                    return Err(e.into());
                }
            };
            if effects.is_empty() {
                return Ok(current.revision());
            }

            match self.store.commit(Mutation::OrderingPut {
                graph: next,
                expected_revision: current.revision(),
            }) {
                Ok(_) => {
                    let revision = current.revision() + 1;
                    tracing::info!(
                        task_queue,
                        build_id = %request.version_id,
                        revision,
                        make_default = request.make_default,
                        "ordering updated"
                    );
                    self.executor.execute_all(effects).await?;
                    // A new default may unlock parked work for waiting pollers
                    self.distributor.wake(task_queue);
                    return Ok(revision);
                }
                Err(e) if e.is_conflict() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(LifecycleError::CasExhausted {
            what: format!("ordering of {}", task_queue),
            attempts: self.cas_retries,
        })
    }

    /// Defaults and leaves, at most `max_depth` hops from each default
    ///
    /// A task queue that was never ordered yields an empty view.
    pub fn get_ordering(&self, task_queue: &str, max_depth: Option<usize>) -> OrderingView {
        let graph = self.current(task_queue);
        graph.get_ordering(max_depth.unwrap_or(self.max_depth))
    }

    pub fn resolve_dispatch_target(
        &self,
        task_queue: &str,
        originating: Option<&BuildId>,
    ) -> DispatchTarget {
        self.distributor.resolve_target(task_queue, originating)
    }
}

#[cfg(test)]
#[path = "versioning_tests.rs"]
mod tests;
