// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Lifecycle Events
//
// In-memory broadcast of agent lifecycle transitions to the admin SSE
// endpoint and the webhook alerter. Bounded ring buffer: slow subscribers
// lag and drop, the publisher never blocks. Events are lost on restart.

use crate::domain::events::Event;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub const DEFAULT_CAPACITY: usize = 256;

/// Publishes lifecycle events to all current subscribers.
///
/// Cloneable handle around a broadcast channel. `emit` is synchronous and
/// non-blocking, so it is safe to call from inside a state-transition
/// critical section.
#[derive(Clone)]
pub struct Emitter {
    sender: broadcast::Sender<Event>,
}

impl Emitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: Event) {
        match self.sender.send(event) {
            Ok(n) => debug!(receivers = n, "event published"),
            // No live subscribers; nothing to deliver to.
            Err(broadcast::error::SendError(ev)) => {
                debug!(event = %ev.kind, agent = %ev.agent, "event dropped, no subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    /// Receives the next event, skipping over any gap caused by lag. Returns
    /// `None` once the emitter is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(dropped = n, "event subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
