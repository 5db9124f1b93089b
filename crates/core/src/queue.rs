// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task sub-queue with lease (visibility timeout) support
//!
//! One `TaskQueue` holds the work routed to a single `(task_queue, target)`
//! pair. Leased tasks have a deadline; if they are neither acked nor nacked
//! before it passes, a `Tick` returns them to the queue. A task that runs out
//! of attempts is dead-lettered.

use crate::clock::Clock;
use crate::effect::{Effect, Event};
use crate::id::{LeaseId, TaskId};
use crate::task::Task;
use crate::version::DispatchTarget;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// A task waiting on a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub task: Task,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    /// Deliveries that ended without an ack
    pub attempts: u32,
    pub max_attempts: u32,
}

impl QueuedTask {
    pub fn new(task: Task, max_attempts: u32, now: DateTime<Utc>) -> Self {
        Self {
            priority: task.priority(),
            task,
            enqueued_at: now,
            attempts: 0,
            max_attempts,
        }
    }
}

/// A delivered task awaiting ack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub queued: QueuedTask,
    pub lease_id: LeaseId,
    pub leased_at: Instant,
    pub visible_after: Instant,
}

/// A task that failed too many times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub queued: QueuedTask,
    pub reason: String,
    pub dead_at: DateTime<Utc>,
}

/// Events that can change queue state
#[derive(Clone, Debug)]
pub enum QueueEvent {
    Push { queued: QueuedTask },
    /// Deliver the head of the queue to one poller
    Lease {
        lease_id: LeaseId,
        timeout: Option<Duration>,
    },
    Ack { lease_id: LeaseId },
    Nack { lease_id: LeaseId, reason: String },
    /// Remove a task that has not been delivered yet
    Withdraw { task_id: TaskId },
    /// Expire leases whose deadline is at or before `now`
    Tick { now: Instant },
}

#[derive(Debug, Clone)]
pub struct TaskQueue {
    pub name: String,
    pub target: DispatchTarget,
    pub pending: Vec<QueuedTask>,
    pub leased: Vec<Lease>,
    pub dead_letters: Vec<DeadLetter>,
    pub lease_timeout: Duration,
}

impl TaskQueue {
    pub fn new(name: impl Into<String>, target: DispatchTarget, lease_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            target,
            pending: Vec::new(),
            leased: Vec::new(),
            dead_letters: Vec::new(),
            lease_timeout,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn lease(&self, lease_id: &LeaseId) -> Option<&Lease> {
        self.leased.iter().find(|l| &l.lease_id == lease_id)
    }

    pub fn contains_pending(&self, task_id: &TaskId) -> bool {
        self.pending.iter().any(|q| &q.task.id == task_id)
    }

    /// Earliest lease deadline, used to bound poll waits
    pub fn next_expiry(&self) -> Option<Instant> {
        self.leased.iter().map(|l| l.visible_after).min()
    }

    /// Pure transition function - returns new state and effects
    pub fn transition(&self, event: QueueEvent, clock: &impl Clock) -> (TaskQueue, Vec<Effect>) {
        let now = clock.now();

        match event {
            QueueEvent::Push { queued } => {
                let mut pending = self.pending.clone();
                let task_id = queued.task.id.clone();
                pending.push(queued);
                sort_pending(&mut pending);

                let queue = TaskQueue {
                    pending,
                    ..self.clone()
                };
                let effects = vec![Effect::Emit(Event::TaskEnqueued {
                    task_queue: self.name.clone(),
                    target: self.target.to_string(),
                    task_id,
                })];
                (queue, effects)
            }

            QueueEvent::Lease { lease_id, timeout } => {
                if self.pending.is_empty() {
                    return (self.clone(), vec![]);
                }

                let mut pending = self.pending.clone();
                let queued = pending.remove(0);
                let timeout = timeout.unwrap_or(self.lease_timeout);
                let effects = vec![Effect::Emit(Event::TaskLeased {
                    task_queue: self.name.clone(),
                    task_id: queued.task.id.clone(),
                    lease_id: lease_id.clone(),
                    attempt: queued.attempts + 1,
                })];

                let mut leased = self.leased.clone();
                leased.push(Lease {
                    queued,
                    lease_id,
                    leased_at: now,
                    visible_after: now + timeout,
                });

                let queue = TaskQueue {
                    pending,
                    leased,
                    ..self.clone()
                };
                (queue, effects)
            }

            QueueEvent::Ack { lease_id } => {
                let (acked, remaining): (Vec<_>, Vec<_>) = self
                    .leased
                    .iter()
                    .cloned()
                    .partition(|l| l.lease_id == lease_id);

                let Some(lease) = acked.into_iter().next() else {
                    return (self.clone(), vec![]);
                };

                let queue = TaskQueue {
                    leased: remaining,
                    ..self.clone()
                };
                let effects = vec![Effect::Emit(Event::TaskAcked {
                    task_queue: self.name.clone(),
                    task_id: lease.queued.task.id,
                })];
                (queue, effects)
            }

            QueueEvent::Nack { lease_id, reason } => {
                let (nacked, remaining): (Vec<_>, Vec<_>) = self
                    .leased
                    .iter()
                    .cloned()
                    .partition(|l| l.lease_id == lease_id);

                let Some(lease) = nacked.into_iter().next() else {
                    return (self.clone(), vec![]);
                };

                let mut queue = TaskQueue {
                    leased: remaining,
                    ..self.clone()
                };
                let effects = queue.retry_or_bury(lease.queued, reason, clock.utc_now());
                sort_pending(&mut queue.pending);
                (queue, effects)
            }

            QueueEvent::Withdraw { task_id } => {
                if !self.contains_pending(&task_id) {
                    return (self.clone(), vec![]);
                }
                let pending = self
                    .pending
                    .iter()
                    .filter(|q| q.task.id != task_id)
                    .cloned()
                    .collect();
                let queue = TaskQueue {
                    pending,
                    ..self.clone()
                };
                let effects = vec![Effect::Emit(Event::TaskWithdrawn {
                    task_queue: self.name.clone(),
                    task_id,
                })];
                (queue, effects)
            }

            QueueEvent::Tick { now } => {
                let (expired, active): (Vec<_>, Vec<_>) = self
                    .leased
                    .iter()
                    .cloned()
                    .partition(|l| now >= l.visible_after);

                if expired.is_empty() {
                    return (self.clone(), vec![]);
                }

                let mut queue = TaskQueue {
                    leased: active,
                    ..self.clone()
                };
                let mut effects = vec![];
                let dead_at = clock.utc_now();
                for lease in expired {
                    effects.extend(queue.retry_or_bury(
                        lease.queued,
                        "lease expired".to_string(),
                        dead_at,
                    ));
                }
                sort_pending(&mut queue.pending);
                (queue, effects)
            }
        }
    }

    /// Count a failed delivery, then requeue or dead-letter
    fn retry_or_bury(
        &mut self,
        mut queued: QueuedTask,
        reason: String,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        queued.attempts += 1;
        let task_id = queued.task.id.clone();

        if queued.attempts >= queued.max_attempts {
            self.dead_letters.push(DeadLetter {
                queued,
                reason: reason.clone(),
                dead_at: now,
            });
            vec![Effect::Emit(Event::TaskDeadLettered {
                task_queue: self.name.clone(),
                task_id,
                reason,
            })]
        } else {
            self.pending.push(queued);
            vec![Effect::Emit(Event::TaskRequeued {
                task_queue: self.name.clone(),
                task_id,
                reason,
            })]
        }
    }
}

/// Priority descending, then oldest first; the sort is stable so ties keep push order
fn sort_pending(pending: &mut [QueuedTask]) {
    pending.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.enqueued_at.cmp(&b.enqueued_at))
    });
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
