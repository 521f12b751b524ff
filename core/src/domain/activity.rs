// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Request-activity view shared between the reverse proxy and a lifecycle
/// policy. The proxy mutates, the policy only reads; no lock is held across
/// network I/O.
#[derive(Default)]
pub struct ActivityTracker {
    last_request: Mutex<Option<Instant>>,
    connections: AtomicUsize,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the proxy for every incoming request.
    pub fn mark_request(&self) {
        *self.last_request.lock().unwrap() = Some(Instant::now());
    }

    pub fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().unwrap()
    }

    /// Live long connections (streamed responses, upgrades) that should
    /// inhibit idle-sleep.
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Counts a long connection for as long as the returned guard lives.
    pub fn connection_guard(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            tracker: Arc::clone(self),
        }
    }
}

pub struct ConnectionGuard {
    tracker: Arc<ActivityTracker>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.connections.fetch_sub(1, Ordering::Relaxed);
    }
}
