// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor

use crate::distribution::TaskDistributor;
use crate::error::EngineError;
use crate::events::EventBus;
use nx_core::{cancel_task_id, CallbackMessage, Clock, Effect, IdGen, Task};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Executes effects produced by the pure state machines
pub struct Executor<C: Clock, I: IdGen> {
    distributor: Arc<TaskDistributor<C, I>>,
    deliveries: mpsc::Sender<CallbackMessage>,
    events: EventBus,
}

impl<C: Clock, I: IdGen> Executor<C, I> {
    pub fn new(
        distributor: Arc<TaskDistributor<C, I>>,
        deliveries: mpsc::Sender<CallbackMessage>,
        events: EventBus,
    ) -> Self {
        Self {
            distributor,
            deliveries,
            events,
        }
    }

    /// Execute a single effect with tracing
    pub async fn execute(&self, effect: Effect) -> Result<(), EngineError> {
        use nx_core::TracedEffect;

        let op_name = effect.name();
        let span = tracing::info_span!("effect", effect = op_name);
        let _guard = span.enter();

        tracing::info!(fields = ?effect.fields(), "executing");

        let start = std::time::Instant::now();
        let result = self.execute_inner(effect).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "completed"),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "failed"
            ),
        }

        result
    }

    async fn execute_inner(&self, effect: Effect) -> Result<(), EngineError> {
        match effect {
            Effect::Emit(event) => {
                self.events.publish(event);
                Ok(())
            }

            Effect::DispatchCancel {
                key,
                task_queue,
                token,
                build_id,
            } => {
                // Routed through the build that accepted the work
                let task = Task::cancel(cancel_task_id(&key), key, token, build_id);
                self.distributor.enqueue(&task_queue, task);
                Ok(())
            }

            Effect::DeliverCallback(message) => self
                .deliveries
                .send(message)
                .await
                .map_err(|_| EngineError::DeliveryClosed),
        }
    }

    /// Execute effects in order, stopping at the first failure
    pub async fn execute_all(&self, effects: Vec<Effect>) -> Result<(), EngineError> {
        for effect in effects {
            self.execute(effect).await?;
        }
        Ok(())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
