// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! On-demand lifecycle policy.
//!
//! Wakes an agent's container when request traffic arrives, sleeps it after
//! an idle period, restarts it when health probes fail, and gives up into
//! `degraded` once the restart budget is spent.
//!
//! All state lives behind a single mutex and every transition funnels
//! through one sink that stamps `last_sleep` and publishes the event inside
//! the critical section, so observers see transitions and events in the same
//! total order. The lock is never held across a probe or a container call.

use crate::domain::activity::ActivityTracker;
use crate::domain::agent::AgentState;
use crate::domain::events::{Event, EventKind};
use crate::domain::lifecycle::{ContainerStatus, LifecycleDriver};
use crate::infrastructure::event_bus::Emitter;
use crate::infrastructure::health::HealthChecker;
use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OnDemandConfig {
    pub agent: String,
    pub container_name: String,
    pub hostname: String,
    pub health_url: String,
    /// Tick period of the control loop.
    pub check_interval: Duration,
    /// Deadline from start issue to first successful probe.
    pub startup_timeout: Duration,
    /// Inactivity required before attempting sleep.
    pub idle_timeout: Duration,
    /// Minimum time between entering sleep and honoring a wake; zero
    /// disables the gate.
    pub wake_cooldown: Duration,
    /// Consecutive probe failures tolerated while ready.
    pub max_failures: u32,
    /// Restarts allowed between successful readiness episodes.
    pub max_restart_attempts: u32,
    /// Grace period handed to the driver on stop.
    pub stop_grace: Duration,
}

impl Default for OnDemandConfig {
    fn default() -> Self {
        Self {
            agent: String::new(),
            container_name: String::new(),
            hostname: String::new(),
            health_url: String::new(),
            check_interval: Duration::from_secs(5),
            startup_timeout: Duration::from_secs(60),
            idle_timeout: Duration::ZERO,
            wake_cooldown: Duration::from_secs(30),
            max_failures: 3,
            max_restart_attempts: 3,
            stop_grace: Duration::from_secs(10),
        }
    }
}

struct Inner {
    state: AgentState,
    consecutive_failures: u32,
    restart_attempts: u32,
    last_sleep: Option<Instant>,
    last_ready: Option<Instant>,
    last_activity: Option<Instant>,
    start_deadline: Option<Instant>,
    /// Whether the runtime has accepted the start for the current wake.
    start_issued: bool,
    wake_requested: bool,
    sleep_requested: bool,
}

/// Read-only view of the controller for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct OnDemandSnapshot {
    pub state: AgentState,
    pub consecutive_failures: u32,
    pub restart_attempts: u32,
    pub seconds_since_sleep: Option<u64>,
    pub seconds_since_activity: Option<u64>,
    pub active_connections: usize,
}

pub struct OnDemand {
    cfg: OnDemandConfig,
    driver: Arc<dyn LifecycleDriver>,
    activity: Arc<ActivityTracker>,
    emitter: Emitter,
    health: HealthChecker,
    inner: Mutex<Inner>,
    /// Wakes the control loop for queued wake/sleep intents.
    intents: Notify,
}

impl OnDemand {
    pub fn new(
        driver: Arc<dyn LifecycleDriver>,
        cfg: OnDemandConfig,
        activity: Arc<ActivityTracker>,
        emitter: Emitter,
    ) -> Result<Self> {
        if cfg.idle_timeout.is_zero() {
            bail!("on-demand policy for {:?} requires idle_timeout > 0", cfg.agent);
        }
        if cfg.max_failures == 0 {
            bail!("on-demand policy for {:?} requires max_failures >= 1", cfg.agent);
        }
        if cfg.check_interval.is_zero() {
            bail!("on-demand policy for {:?} requires check_interval > 0", cfg.agent);
        }

        Ok(Self {
            driver,
            activity,
            emitter,
            health: HealthChecker::new(),
            inner: Mutex::new(Inner {
                state: AgentState::Unknown,
                consecutive_failures: 0,
                restart_attempts: 0,
                last_sleep: None,
                last_ready: None,
                last_activity: None,
                start_deadline: None,
                start_issued: false,
                wake_requested: false,
                sleep_requested: false,
            }),
            intents: Notify::new(),
            cfg,
        })
    }

    /// One-shot boot-state declaration, called before the control loop runs.
    ///
    /// A running container enters `starting` (health not yet verified) with
    /// the idle clock primed so it is not put to sleep the moment it proves
    /// healthy. A stopped one enters `sleeping` with the cooldown armed from
    /// boot.
    pub fn set_initial_state(&self, running: bool) {
        let mut inner = self.inner.lock().unwrap();
        if running {
            let now = Instant::now();
            inner.last_ready = Some(now);
            inner.start_deadline = Some(now + self.cfg.startup_timeout);
            inner.start_issued = true;
            self.transition(&mut inner, AgentState::Starting);
        } else {
            self.transition(&mut inner, AgentState::Sleeping);
        }
    }

    pub fn current_state(&self) -> AgentState {
        self.inner.lock().unwrap().state
    }

    /// Data-path hook. Never blocks: stamps activity and, when sleeping and
    /// past the cooldown, queues a wake for the control loop.
    pub fn notify_request(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_activity = Some(Instant::now());
        if inner.state == AgentState::Sleeping
            && self.cooldown_elapsed(&inner)
            && !inner.wake_requested
        {
            inner.wake_requested = true;
            self.intents.notify_one();
        }
    }

    /// Admin wake: ignores the cooldown but still coalesces with any wake
    /// already in flight.
    pub fn wake(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == AgentState::Sleeping && !inner.wake_requested {
            inner.wake_requested = true;
            self.intents.notify_one();
        }
    }

    /// Admin sleep.
    pub fn sleep(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == AgentState::Ready && !inner.sleep_requested {
            inner.sleep_requested = true;
            self.intents.notify_one();
        }
    }

    pub fn snapshot(&self) -> OnDemandSnapshot {
        let inner = self.inner.lock().unwrap();
        OnDemandSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            restart_attempts: inner.restart_attempts,
            seconds_since_sleep: inner.last_sleep.map(|t| t.elapsed().as_secs()),
            seconds_since_activity: inner.last_activity.map(|t| t.elapsed().as_secs()),
            active_connections: self.activity.active_connections(),
        }
    }

    /// Control loop. Ticks every `check_interval`; a tick that overruns is
    /// followed immediately, never queued. Exits on cancellation and issues
    /// no container calls afterwards.
    pub async fn run_loop(&self, shutdown: CancellationToken) {
        info!(agent = %self.cfg.agent, "on-demand control loop starting");
        let mut tick = interval(self.cfg.check_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(agent = %self.cfg.agent, "on-demand control loop stopping");
                    break;
                }
                _ = self.intents.notified() => self.handle_intents().await,
                _ = tick.tick() => self.tick().await,
            }
        }
    }

    // --- transitions -----------------------------------------------------

    /// The single state sink. Updates `last_sleep` on entry to sleeping and
    /// emits the transition event iff the state actually changed, inside the
    /// caller's critical section.
    fn transition(&self, inner: &mut Inner, new: AgentState) -> bool {
        if inner.state == new {
            return false;
        }
        let old = inner.state;
        inner.state = new;
        if new == AgentState::Sleeping {
            inner.last_sleep = Some(Instant::now());
        }
        debug!(agent = %self.cfg.agent, from = %old, to = %new, "state transition");
        if let Some(kind) = event_kind(new) {
            self.emitter.emit(Event::new(kind, &self.cfg.agent));
        }
        true
    }

    fn set_state(&self, new: AgentState) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.transition(&mut inner, new)
    }

    fn cooldown_elapsed(&self, inner: &Inner) -> bool {
        if self.cfg.wake_cooldown.is_zero() {
            return true;
        }
        match inner.last_sleep {
            Some(t) => t.elapsed() >= self.cfg.wake_cooldown,
            None => true,
        }
    }

    // --- intent handling -------------------------------------------------

    async fn handle_intents(&self) {
        let (wake, sleep) = {
            let mut inner = self.inner.lock().unwrap();
            (
                std::mem::take(&mut inner.wake_requested),
                std::mem::take(&mut inner.sleep_requested),
            )
        };
        if sleep {
            self.do_sleep().await;
        }
        if wake {
            self.do_wake().await;
        }
    }

    async fn do_wake(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            // Coalesce: a wake racing an in-flight wake or an unexpected
            // state is dropped here, keeping starts single-flight.
            if inner.state != AgentState::Sleeping {
                return;
            }
            self.transition(&mut inner, AgentState::Waking);
            inner.start_deadline = Some(Instant::now() + self.cfg.startup_timeout);
            inner.start_issued = false;
        }
        self.try_start().await;
        self.probe().await;
    }

    async fn do_sleep(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != AgentState::Ready {
                return;
            }
            self.transition(&mut inner, AgentState::Stopping);
        }
        match self.driver.stop(self.cfg.stop_grace).await {
            Ok(()) => {
                self.set_state(AgentState::Sleeping);
            }
            Err(e) => {
                // Stop failures do not spend the restart budget.
                warn!(agent = %self.cfg.agent, error = %e, "stop failed, agent stays up");
                self.set_state(AgentState::Ready);
            }
        }
    }

    // --- tick dispatch ---------------------------------------------------

    async fn tick(&self) {
        match self.current_state() {
            AgentState::Ready => self.tick_ready().await,
            AgentState::Waking | AgentState::Starting => self.tick_waking().await,
            AgentState::Sleeping => self.tick_sleeping().await,
            AgentState::Stopping => self.tick_stopping().await,
            AgentState::Degraded => self.tick_degraded().await,
            AgentState::Unknown => self.tick_unknown().await,
        }
    }

    async fn tick_ready(&self) {
        if self.probe().await {
            self.maybe_idle_sleep().await;
            return;
        }

        enum Decision {
            Wait,
            Restart,
            Degraded,
        }
        let decision = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != AgentState::Ready
                || inner.consecutive_failures < self.cfg.max_failures
            {
                Decision::Wait
            } else if inner.restart_attempts < self.cfg.max_restart_attempts {
                inner.restart_attempts += 1;
                inner.consecutive_failures = 0;
                self.emitter.emit(
                    Event::new(EventKind::RestartAttempt, &self.cfg.agent).with_detail(format!(
                        "attempt {}/{}",
                        inner.restart_attempts, self.cfg.max_restart_attempts
                    )),
                );
                Decision::Restart
            } else {
                self.transition(&mut inner, AgentState::Degraded);
                Decision::Degraded
            }
        };

        match decision {
            Decision::Wait | Decision::Degraded => {}
            Decision::Restart => {
                warn!(agent = %self.cfg.agent, "health failures exceeded, restarting container");
                self.restart_cycle().await;
            }
        }
    }

    async fn tick_waking(&self) {
        let need_start = {
            let inner = self.inner.lock().unwrap();
            matches!(inner.state, AgentState::Waking | AgentState::Starting) && !inner.start_issued
        };
        if need_start {
            self.try_start().await;
        }

        if self.probe().await {
            return;
        }

        let expired = {
            let inner = self.inner.lock().unwrap();
            matches!(inner.state, AgentState::Waking | AgentState::Starting)
                && inner
                    .start_deadline
                    .is_some_and(|deadline| Instant::now() >= deadline)
        };
        if expired {
            self.handle_start_deadline().await;
        }
    }

    async fn tick_sleeping(&self) {
        // Reconcile drift: the runtime thinks the container is up even
        // though we put it to sleep.
        match self.driver.status().await {
            Ok(ContainerStatus::Running) => {
                warn!(
                    agent = %self.cfg.agent,
                    container = %self.cfg.container_name,
                    "container running while agent sleeping, stopping it"
                );
                self.set_state(AgentState::Stopping);
                match self.driver.stop(self.cfg.stop_grace).await {
                    Ok(()) => {
                        self.set_state(AgentState::Sleeping);
                    }
                    Err(e) => {
                        warn!(agent = %self.cfg.agent, error = %e, "drift stop failed");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => debug!(agent = %self.cfg.agent, error = %e, "status check failed"),
        }
    }

    async fn tick_stopping(&self) {
        match self.driver.status().await {
            Ok(ContainerStatus::Exited) | Ok(ContainerStatus::Missing) => {
                self.set_state(AgentState::Sleeping);
            }
            Ok(ContainerStatus::Running) => {
                // An earlier stop failed or is still in flight; try again.
                if self.driver.stop(self.cfg.stop_grace).await.is_ok() {
                    self.set_state(AgentState::Sleeping);
                }
            }
            Ok(ContainerStatus::Unknown) | Err(_) => {}
        }
    }

    async fn tick_degraded(&self) {
        // Keep probing; a recovered backend clears the episode.
        self.probe().await;
    }

    async fn tick_unknown(&self) {
        match self.driver.status().await {
            Ok(ContainerStatus::Running) => {
                if !self.probe().await {
                    // Running but unhealthy: treat it as a wake in progress
                    // so the startup deadline and restart budget apply.
                    let mut inner = self.inner.lock().unwrap();
                    if inner.state == AgentState::Unknown {
                        self.transition(&mut inner, AgentState::Waking);
                        inner.start_deadline = Some(Instant::now() + self.cfg.startup_timeout);
                        inner.start_issued = true;
                    }
                }
            }
            Ok(ContainerStatus::Exited) | Ok(ContainerStatus::Missing) => {
                self.set_state(AgentState::Sleeping);
            }
            Ok(ContainerStatus::Unknown) => {}
            Err(e) => debug!(agent = %self.cfg.agent, error = %e, "status check failed"),
        }
    }

    // --- probing and start/stop ------------------------------------------

    /// Runs one health probe and applies its outcome to the counters and, on
    /// success, the state. Returns whether the backend was healthy.
    async fn probe(&self) -> bool {
        let timeout = HealthChecker::probe_timeout(self.cfg.check_interval);
        match self.health.check(&self.cfg.health_url, timeout).await {
            Ok(()) => {
                let mut inner = self.inner.lock().unwrap();
                inner.consecutive_failures = 0;
                if matches!(
                    inner.state,
                    AgentState::Waking
                        | AgentState::Starting
                        | AgentState::Degraded
                        | AgentState::Unknown
                ) {
                    inner.restart_attempts = 0;
                    inner.last_ready = Some(Instant::now());
                    inner.start_deadline = None;
                    self.transition(&mut inner, AgentState::Ready);
                }
                true
            }
            Err(e) => {
                let mut inner = self.inner.lock().unwrap();
                if inner.state == AgentState::Ready {
                    inner.consecutive_failures += 1;
                    debug!(
                        agent = %self.cfg.agent,
                        error = %e,
                        consecutive_failures = inner.consecutive_failures,
                        "health check failed"
                    );
                }
                false
            }
        }
    }

    async fn try_start(&self) {
        match self.driver.start().await {
            Ok(()) => {
                self.inner.lock().unwrap().start_issued = true;
            }
            Err(e) => {
                warn!(agent = %self.cfg.agent, error = %e, "container start failed");
                let mut inner = self.inner.lock().unwrap();
                inner.restart_attempts += 1;
                // A budget of zero degrades on the first failure.
                if inner.restart_attempts >= self.cfg.max_restart_attempts.max(1) {
                    self.transition(&mut inner, AgentState::Degraded);
                }
            }
        }
    }

    /// Startup deadline expired without a successful probe: spend one
    /// restart attempt on a stop-then-start, or give up.
    async fn handle_start_deadline(&self) {
        let proceed = {
            let mut inner = self.inner.lock().unwrap();
            if !matches!(inner.state, AgentState::Waking | AgentState::Starting) {
                return;
            }
            inner.restart_attempts += 1;
            if inner.restart_attempts >= self.cfg.max_restart_attempts.max(1) {
                self.transition(&mut inner, AgentState::Degraded);
                false
            } else {
                self.emitter.emit(
                    Event::new(EventKind::RestartAttempt, &self.cfg.agent).with_detail(format!(
                        "startup timeout, attempt {}/{}",
                        inner.restart_attempts, self.cfg.max_restart_attempts
                    )),
                );
                self.transition(&mut inner, AgentState::Stopping);
                true
            }
        };
        if !proceed {
            warn!(agent = %self.cfg.agent, "restart budget exhausted, agent degraded");
            return;
        }

        if let Err(e) = self.driver.stop(self.cfg.stop_grace).await {
            warn!(agent = %self.cfg.agent, error = %e, "stop during restart failed");
            return;
        }
        self.rewake();
        self.try_start().await;
    }

    /// `ready` collapsed under probe failures: stop, then wake again
    /// immediately. The cooldown is not consulted; automatic recovery is
    /// not an incoming wake.
    async fn restart_cycle(&self) {
        self.set_state(AgentState::Stopping);
        if let Err(e) = self.driver.stop(self.cfg.stop_grace).await {
            warn!(agent = %self.cfg.agent, error = %e, "stop during restart failed");
            return;
        }
        self.rewake();
        self.try_start().await;
    }

    /// stopping to sleeping to waking, with a fresh startup deadline.
    fn rewake(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.transition(&mut inner, AgentState::Sleeping);
        self.transition(&mut inner, AgentState::Waking);
        inner.start_deadline = Some(Instant::now() + self.cfg.startup_timeout);
        inner.start_issued = false;
    }

    async fn maybe_idle_sleep(&self) {
        if self.activity.active_connections() > 0 {
            return;
        }
        let newest = {
            let inner = self.inner.lock().unwrap();
            if inner.state != AgentState::Ready {
                return;
            }
            [self.activity.last_request(), inner.last_activity, inner.last_ready]
                .into_iter()
                .flatten()
                .max()
        };
        let Some(newest) = newest else { return };
        if newest.elapsed() >= self.cfg.idle_timeout {
            info!(agent = %self.cfg.agent, "idle timeout reached, putting agent to sleep");
            self.do_sleep().await;
        }
    }
}

fn event_kind(state: AgentState) -> Option<EventKind> {
    match state {
        AgentState::Starting => Some(EventKind::Starting),
        AgentState::Ready => Some(EventKind::Ready),
        AgentState::Sleeping => Some(EventKind::Sleeping),
        AgentState::Waking => Some(EventKind::Waking),
        AgentState::Stopping => Some(EventKind::Stopping),
        AgentState::Degraded => Some(EventKind::Degraded),
        AgentState::Unknown => None,
    }
}

#[async_trait::async_trait]
impl crate::domain::policy::AgentPolicy for OnDemand {
    fn state(&self) -> AgentState {
        self.current_state()
    }

    fn on_request(&self) {
        self.notify_request();
    }

    fn request_wake(&self) {
        self.wake();
    }

    fn request_sleep(&self) {
        self.sleep();
    }

    async fn run(&self, shutdown: CancellationToken) {
        self.run_loop(shutdown).await;
    }

    fn introspect(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}
