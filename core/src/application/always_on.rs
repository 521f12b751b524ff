// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::AgentState;
use crate::domain::events::{Event, EventKind};
use crate::infrastructure::event_bus::Emitter;
use crate::infrastructure::health::HealthChecker;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct AlwaysOnConfig {
    pub agent: String,
    pub health_url: String,
    pub check_interval: Duration,
    pub max_failures: u32,
}

/// Always-on lifecycle policy: a health poll and a degradation counter.
///
/// The container is expected to run permanently (managed out of band);
/// Warren only tracks whether it is serving. Requests never wake or sleep
/// anything here.
pub struct AlwaysOn {
    cfg: AlwaysOnConfig,
    emitter: Emitter,
    health: HealthChecker,
    inner: Mutex<AlwaysOnInner>,
}

struct AlwaysOnInner {
    state: AgentState,
    failures: u32,
}

impl AlwaysOn {
    pub fn new(cfg: AlwaysOnConfig, emitter: Emitter) -> Self {
        Self {
            cfg,
            emitter,
            health: HealthChecker::new(),
            inner: Mutex::new(AlwaysOnInner {
                state: AgentState::Starting,
                failures: 0,
            }),
        }
    }

    pub fn current_state(&self) -> AgentState {
        self.inner.lock().unwrap().state
    }

    async fn tick(&self) {
        let timeout = HealthChecker::probe_timeout(self.cfg.check_interval);
        match self.health.check(&self.cfg.health_url, timeout).await {
            Ok(()) => self.on_healthy(),
            Err(e) => self.on_unhealthy(&e.to_string()),
        }
    }

    fn on_healthy(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != AgentState::Ready {
            info!(agent = %self.cfg.agent, "agent became healthy");
            inner.state = AgentState::Ready;
            self.emitter.emit(Event::new(EventKind::Ready, &self.cfg.agent));
        }
        inner.failures = 0;
    }

    fn on_unhealthy(&self, detail: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures += 1;
        warn!(
            agent = %self.cfg.agent,
            error = detail,
            consecutive_failures = inner.failures,
            "health check failed"
        );

        if inner.failures >= self.cfg.max_failures && inner.state != AgentState::Degraded {
            error!(
                agent = %self.cfg.agent,
                consecutive_failures = inner.failures,
                max_failures = self.cfg.max_failures,
                "agent degraded, max failures reached"
            );
            inner.state = AgentState::Degraded;
            self.emitter
                .emit(Event::new(EventKind::Degraded, &self.cfg.agent).with_detail(detail));
        }
    }
}

#[async_trait::async_trait]
impl crate::domain::policy::AgentPolicy for AlwaysOn {
    fn state(&self) -> AgentState {
        self.current_state()
    }

    fn on_request(&self) {}

    async fn run(&self, shutdown: CancellationToken) {
        let mut tick = interval(self.cfg.check_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => self.tick().await,
            }
        }
    }
}
