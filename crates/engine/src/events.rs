// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast of emitted events to in-process subscribers.

use nx_core::Event;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Fan-out for state machine events
///
/// Sending never blocks; slow subscribers lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Log the event and hand it to any subscribers
    pub fn publish(&self, event: Event) {
        tracing::debug!(event = event.name(), "event");
        // No subscribers is the common case
        let _ = self.tx.send(event);
    }
}
