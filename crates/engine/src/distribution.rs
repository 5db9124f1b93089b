// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task distribution layer
//!
//! One pull queue per `(task_queue, DispatchTarget)`. Enqueue picks the
//! sub-queue through the task queue's version graph; poll pins a worker to
//! the sub-queue its build id maps to and suspends until work arrives.
//! Pollers of the current default also drain the unversioned sub-queue, which
//! holds work enqueued before any default existed.

use crate::events::EventBus;
use nx_core::config::DispatchConfig;
use nx_core::{
    BuildId, Clock, DeadLetter, DispatchTarget, Effect, IdGen, LeaseId, QueueEvent, QueuedTask,
    Task, TaskId, TaskLease, TaskQueue, VersionType,
};
use nx_storage::Store;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

type QueueKey = (String, DispatchTarget);

/// Result of a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Task(TaskLease),
    /// Timeout elapsed with nothing to hand out
    NoTask,
}

/// Counts for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub leased: usize,
}

#[derive(Default)]
struct Queues {
    queues: HashMap<QueueKey, TaskQueue>,
    leases: HashMap<LeaseId, QueueKey>,
    tasks: HashMap<TaskId, QueueKey>,
}

impl Queues {
    /// Run one queue transition and return its effects
    fn apply(&mut self, key: &QueueKey, event: QueueEvent, clock: &impl Clock) -> Vec<Effect> {
        let Some(queue) = self.queues.get(key) else {
            return vec![];
        };
        let (next, effects) = queue.transition(event, clock);
        self.queues.insert(key.clone(), next);
        effects
    }

    /// Take dead letters out of a queue and forget their bookkeeping
    fn take_dead(&mut self, key: &QueueKey) -> Vec<DeadLetter> {
        let dead = match self.queues.get_mut(key) {
            Some(queue) => std::mem::take(&mut queue.dead_letters),
            None => return vec![],
        };
        for letter in &dead {
            self.tasks.remove(&letter.queued.task.id);
        }
        dead
    }
}

pub struct TaskDistributor<C: Clock, I: IdGen> {
    store: Arc<Store>,
    clock: C,
    ids: I,
    lease_timeout: Duration,
    max_attempts: u32,
    events: EventBus,
    queues: Mutex<Queues>,
    wakers: Mutex<HashMap<String, Arc<Notify>>>,
}

impl<C: Clock, I: IdGen> TaskDistributor<C, I> {
    pub fn new(
        store: Arc<Store>,
        clock: C,
        ids: I,
        config: &DispatchConfig,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            lease_timeout: config.lease_timeout,
            max_attempts: config.max_attempts,
            events,
            queues: Mutex::new(Queues::default()),
            wakers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn waker(&self, task_queue: &str) -> Arc<Notify> {
        let mut wakers = self.wakers.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            wakers
                .entry(task_queue.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Wake every poller of a task queue so it re-checks its sub-queues
    pub fn wake(&self, task_queue: &str) {
        self.waker(task_queue).notify_waiters();
    }

    fn publish(&self, effects: Vec<Effect>) {
        for effect in effects {
            if let Effect::Emit(event) = effect {
                self.events.publish(event);
            }
        }
    }

    /// Sub-queue that new work for this task queue goes to
    pub fn resolve_target(&self, task_queue: &str, originating: Option<&BuildId>) -> DispatchTarget {
        self.store
            .ordering(task_queue)
            .map(|graph| graph.resolve_dispatch_target(originating))
            .unwrap_or(DispatchTarget::Unversioned)
    }

    /// Sub-queues a poller drains, in preference order
    fn poll_targets(&self, task_queue: &str, build_id: Option<&BuildId>) -> Vec<DispatchTarget> {
        let Some(graph) = self.store.ordering(task_queue) else {
            return vec![DispatchTarget::Unversioned];
        };
        let target = graph.poll_target(build_id);
        let serves_default = match &target {
            DispatchTarget::Build(b) => graph.default_for(VersionType::WorkerBuild) == Some(b),
            DispatchTarget::Unversioned => false,
        };
        let mut targets = vec![target];
        if serves_default {
            targets.push(DispatchTarget::Unversioned);
        }
        targets
    }

    /// Route a task to its sub-queue
    ///
    /// Enqueueing a task id that is still queued or leased is a no-op.
    pub fn enqueue(&self, task_queue: &str, task: Task) -> DispatchTarget {
        let target = self.resolve_target(task_queue, task.originating_version.as_ref());
        let key = (task_queue.to_string(), target.clone());
        let task_id = task.id.clone();

        let effects = {
            let mut queues = self.lock();
            if let Some(existing) = queues.tasks.get(&task_id) {
                tracing::debug!(task_id = %task_id, target = %existing.1, "task already queued");
                return existing.1.clone();
            }
            queues.queues.entry(key.clone()).or_insert_with(|| {
                TaskQueue::new(task_queue, target.clone(), self.lease_timeout)
            });
            let queued = QueuedTask::new(task, self.max_attempts, self.clock.utc_now());
            let effects = queues.apply(&key, QueueEvent::Push { queued }, &self.clock);
            queues.tasks.insert(task_id.clone(), key);
            effects
        };

        tracing::info!(task_queue, task_id = %task_id, target = %target, "task enqueued");
        self.publish(effects);
        self.wake(task_queue);
        target
    }

    /// Lease the next task visible to this poller, without waiting
    pub fn try_lease(&self, task_queue: &str, build_id: Option<&BuildId>) -> Option<TaskLease> {
        let targets = self.poll_targets(task_queue, build_id);
        let mut queues = self.lock();

        for target in targets {
            let key = (task_queue.to_string(), target.clone());
            if queues.queues.get(&key).map_or(true, |q| q.is_empty()) {
                continue;
            }

            let lease_id = LeaseId(self.ids.next());
            let effects = queues.apply(
                &key,
                QueueEvent::Lease {
                    lease_id: lease_id.clone(),
                    timeout: None,
                },
                &self.clock,
            );
            let lease = queues
                .queues
                .get(&key)
                .and_then(|q| q.lease(&lease_id))
                .cloned()?;
            queues.leases.insert(lease_id.clone(), key);
            drop(queues);

            self.publish(effects);
            return Some(TaskLease {
                lease_id,
                task_queue: task_queue.to_string(),
                target,
                attempt: lease.queued.attempts + 1,
                task: lease.queued.task,
            });
        }
        None
    }

    /// Suspend until a task is available for this poller or `timeout` elapses
    pub async fn poll(
        &self,
        task_queue: &str,
        build_id: Option<&BuildId>,
        timeout: Duration,
    ) -> PollOutcome {
        let notify = self.waker(task_queue);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking, so a push between the check
            // and the await still wakes us
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(lease) = self.try_lease(task_queue, build_id) {
                return PollOutcome::Task(lease);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::trace!(task_queue, "poll timed out");
                return PollOutcome::NoTask;
            }
        }
    }

    /// Task currently held under a lease
    pub fn leased(&self, lease_id: &LeaseId) -> Option<TaskLease> {
        let queues = self.lock();
        let key = queues.leases.get(lease_id)?;
        let lease = queues.queues.get(key)?.lease(lease_id)?;
        Some(TaskLease {
            lease_id: lease_id.clone(),
            task_queue: key.0.clone(),
            target: key.1.clone(),
            attempt: lease.queued.attempts + 1,
            task: lease.queued.task.clone(),
        })
    }

    /// Acknowledge a lease; false if it is unknown or already settled
    pub fn ack(&self, lease_id: &LeaseId) -> bool {
        let effects = {
            let mut queues = self.lock();
            let Some(key) = queues.leases.remove(lease_id) else {
                return false;
            };
            let task_id = queues
                .queues
                .get(&key)
                .and_then(|q| q.lease(lease_id))
                .map(|l| l.queued.task.id.clone());
            if let Some(task_id) = task_id {
                queues.tasks.remove(&task_id);
            }
            queues.apply(
                &key,
                QueueEvent::Ack {
                    lease_id: lease_id.clone(),
                },
                &self.clock,
            )
        };
        self.publish(effects);
        true
    }

    /// Return a leased task for redelivery
    ///
    /// `None` if the lease is unknown; otherwise any task that ran out of
    /// attempts.
    pub fn nack(&self, lease_id: &LeaseId, reason: &str) -> Option<Vec<DeadLetter>> {
        let (task_queue, effects, dead) = {
            let mut queues = self.lock();
            let key = queues.leases.remove(lease_id)?;
            let effects = queues.apply(
                &key,
                QueueEvent::Nack {
                    lease_id: lease_id.clone(),
                    reason: reason.to_string(),
                },
                &self.clock,
            );
            let dead = queues.take_dead(&key);
            (key.0, effects, dead)
        };
        tracing::info!(task_queue, lease_id = %lease_id, reason, "task nacked");
        self.publish(effects);
        self.wake(&task_queue);
        Some(dead)
    }

    /// Remove a task that has not been delivered yet; false once it is leased
    pub fn withdraw(&self, task_id: &TaskId) -> bool {
        let effects = {
            let mut queues = self.lock();
            let Some(key) = queues.tasks.get(task_id).cloned() else {
                return false;
            };
            let pending = queues
                .queues
                .get(&key)
                .is_some_and(|q| q.contains_pending(task_id));
            if !pending {
                return false;
            }
            queues.tasks.remove(task_id);
            queues.apply(
                &key,
                QueueEvent::Withdraw {
                    task_id: task_id.clone(),
                },
                &self.clock,
            )
        };
        self.publish(effects);
        true
    }

    /// Expire overdue leases, returning tasks that ran out of attempts
    pub fn tick(&self) -> Vec<DeadLetter> {
        let now = self.clock.now();
        let mut woken = Vec::new();
        let mut effects = Vec::new();
        let mut dead = Vec::new();
        {
            let mut queues = self.lock();
            let due: Vec<QueueKey> = queues
                .queues
                .iter()
                .filter(|(_, q)| q.next_expiry().is_some_and(|at| at <= now))
                .map(|(k, _)| k.clone())
                .collect();

            for key in due {
                let expired: Vec<LeaseId> = queues
                    .queues
                    .get(&key)
                    .map(|q| {
                        q.leased
                            .iter()
                            .filter(|l| l.visible_after <= now)
                            .map(|l| l.lease_id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for lease_id in &expired {
                    queues.leases.remove(lease_id);
                }
                effects.extend(queues.apply(&key, QueueEvent::Tick { now }, &self.clock));
                dead.extend(queues.take_dead(&key));
                woken.push(key.0);
            }
        }

        self.publish(effects);
        woken.sort();
        woken.dedup();
        for task_queue in woken {
            self.wake(&task_queue);
        }
        if !dead.is_empty() {
            tracing::warn!(count = dead.len(), "tasks dead-lettered");
        }
        dead
    }

    pub fn stats(&self) -> QueueStats {
        let queues = self.lock();
        queues
            .queues
            .values()
            .fold(QueueStats::default(), |acc, q| QueueStats {
                pending: acc.pending + q.pending.len(),
                leased: acc.leased + q.leased.len(),
            })
    }

    pub fn pending_in(&self, task_queue: &str, target: &DispatchTarget) -> usize {
        self.lock()
            .queues
            .get(&(task_queue.to_string(), target.clone()))
            .map_or(0, |q| q.len())
    }
}

#[cfg(test)]
#[path = "distribution_tests.rs"]
mod tests;
