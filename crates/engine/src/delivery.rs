// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback delivery worker
//!
//! Consumes completion messages from a bounded channel and posts each one on
//! its own task, retrying with exponential backoff. Exhausted deliveries go
//! to the notify adapter and an inspectable failure list. Either way the
//! message is settled in the store's outbox; the operation record is never
//! touched from here.

use crate::events::EventBus;
use chrono::{DateTime, Utc};
use nx_adapters::{
    is_success, CallbackAdapter, CallbackError, CallbackRequest, NotifyAdapter,
    TracedCallbackAdapter,
};
use nx_core::{Backoff, CallbackMessage, Clock, Event, Mutation, OperationKey, RetryDecision};
use nx_storage::Store;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Channel the executor hands completion messages to
pub fn channel(
    capacity: usize,
) -> (
    mpsc::Sender<CallbackMessage>,
    mpsc::Receiver<CallbackMessage>,
) {
    mpsc::channel(capacity.max(1))
}

/// One delivery that was given up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub key: OperationKey,
    pub url: String,
    pub token: String,
    pub attempts: u32,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct DeliveryFailures {
    inner: Arc<Mutex<Vec<DeliveryFailure>>>,
}

impl DeliveryFailures {
    fn record(&self, failure: DeliveryFailure) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(failure);
    }

    pub fn list(&self) -> Vec<DeliveryFailure> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Delivered { attempts: u32, status: u16 },
    Exhausted { attempts: u32, reason: String },
}

#[derive(Clone)]
pub struct DeliveryWorker<CB, N, C> {
    callbacks: TracedCallbackAdapter<CB>,
    notify: N,
    clock: C,
    backoff: Backoff,
    events: EventBus,
    failures: DeliveryFailures,
    outbox: Arc<Store>,
}

impl<CB, N, C> DeliveryWorker<CB, N, C>
where
    CB: CallbackAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    pub fn new(
        callbacks: CB,
        notify: N,
        clock: C,
        backoff: Backoff,
        events: EventBus,
        failures: DeliveryFailures,
        outbox: Arc<Store>,
    ) -> Self {
        Self {
            callbacks: TracedCallbackAdapter::new(callbacks),
            notify,
            clock,
            backoff,
            events,
            failures,
            outbox,
        }
    }

    /// Drain the channel until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<CallbackMessage>) {
        tracing::info!("delivery worker started");
        while let Some(message) = rx.recv().await {
            let worker = self.clone();
            tokio::spawn(async move {
                worker.deliver(message).await;
            });
        }
        tracing::info!("delivery worker stopped");
    }

    /// Deliver one message, retrying until success or the budget is spent,
    /// then settle it in the outbox
    pub async fn deliver(&self, message: CallbackMessage) -> DeliveryReport {
        let report = self.attempt(&message).await;
        if let Err(e) = self.outbox.commit(Mutation::CallbackSettled {
            key: message.key.clone(),
            token: message.token.clone(),
        }) {
            tracing::warn!(operation_id = %message.key, error = %e, "failed to settle callback");
        }
        report
    }

    async fn attempt(&self, message: &CallbackMessage) -> DeliveryReport {
        let key = message.key.clone();
        let request = match CallbackRequest::from_message(message) {
            Ok(request) => request,
            Err(e) => return self.exhausted(message, 0, e.to_string()).await,
        };

        let started = self.clock.now();
        let mut attempt = 1u32;
        loop {
            let reason = match self.callbacks.post(&request).await {
                Ok(status) if is_success(status) => {
                    tracing::info!(operation_id = %key, attempts = attempt, status, "callback delivered");
                    self.events.publish(Event::CallbackDelivered {
                        key,
                        attempts: attempt,
                        status,
                    });
                    return DeliveryReport::Delivered {
                        attempts: attempt,
                        status,
                    };
                }
                Ok(status) => format!("status {}", status),
                // Retrying cannot fix the target
                Err(e @ CallbackError::InvalidUrl(_)) | Err(e @ CallbackError::Encode(_)) => {
                    return self.exhausted(message, attempt, e.to_string()).await;
                }
                Err(e) => e.to_string(),
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            match self.backoff.next(attempt, elapsed) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        operation_id = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "callback failed, retrying"
                    );
                    self.events.publish(Event::CallbackRetrying {
                        key: key.clone(),
                        attempt,
                        reason,
                    });
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => return self.exhausted(message, attempt, reason).await,
            }
        }
    }

    async fn exhausted(
        &self,
        message: &CallbackMessage,
        attempts: u32,
        reason: String,
    ) -> DeliveryReport {
        tracing::error!(
            operation_id = %message.key,
            url = %message.url,
            attempts,
            reason = %reason,
            "callback delivery exhausted"
        );
        let text = format!(
            "callback for {} ({}) to {} gave up after {} attempts: {}",
            message.key, message.state, message.url, attempts, reason
        );
        if let Err(e) = self.notify.send("callbacks", &text).await {
            tracing::warn!(error = %e, "failed to report exhausted callback");
        }
        self.failures.record(DeliveryFailure {
            key: message.key.clone(),
            url: message.url.clone(),
            token: message.token.clone(),
            attempts,
            reason: reason.clone(),
            failed_at: self.clock.utc_now(),
        });
        self.events.publish(Event::CallbackExhausted {
            key: message.key.clone(),
            attempts,
            reason: reason.clone(),
        });
        DeliveryReport::Exhausted { attempts, reason }
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
