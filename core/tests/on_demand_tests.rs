// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for the on-demand lifecycle controller, driven through a
//! mock container driver and a real (local) health endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use warren_core::application::on_demand::{OnDemand, OnDemandConfig};
use warren_core::domain::activity::ActivityTracker;
use warren_core::domain::agent::AgentState;
use warren_core::domain::events::EventKind;
use warren_core::domain::lifecycle::{ContainerStatus, LifecycleDriver, LifecycleError};
use warren_core::infrastructure::event_bus::{Emitter, EventReceiver};

struct MockDriver {
    status: Mutex<ContainerStatus>,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    fail_starts: AtomicBool,
}

impl MockDriver {
    fn new(status: ContainerStatus) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(status),
            start_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            fail_starts: AtomicBool::new(false),
        })
    }

    fn set_status(&self, status: ContainerStatus) {
        *self.status.lock().unwrap() = status;
    }

    fn fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    fn starts(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    fn stops(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LifecycleDriver for MockDriver {
    async fn status(&self) -> Result<ContainerStatus, LifecycleError> {
        Ok(*self.status.lock().unwrap())
    }

    async fn start(&self) -> Result<(), LifecycleError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_starts.load(Ordering::SeqCst) {
            return Err(LifecycleError::StartFailed("injected".to_string()));
        }
        *self.status.lock().unwrap() = ContainerStatus::Running;
        Ok(())
    }

    async fn stop(&self, _grace: Duration) -> Result<(), LifecycleError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        *self.status.lock().unwrap() = ContainerStatus::Exited;
        Ok(())
    }
}

/// Local health endpoint whose status code can be flipped mid-test.
async fn spawn_health_server(status: Arc<AtomicU16>) -> String {
    async fn health(State(status): State<Arc<AtomicU16>>) -> StatusCode {
        StatusCode::from_u16(status.load(Ordering::SeqCst)).unwrap_or(StatusCode::OK)
    }

    let app = Router::new().route("/health", get(health)).with_state(status);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/health")
}

struct Harness {
    controller: Arc<OnDemand>,
    driver: Arc<MockDriver>,
    activity: Arc<ActivityTracker>,
    health_status: Arc<AtomicU16>,
    events: EventReceiver,
    shutdown: CancellationToken,
}

async fn start_harness(
    initial: ContainerStatus,
    initial_running: bool,
    tweak: impl FnOnce(&mut OnDemandConfig),
) -> Harness {
    let health_status = Arc::new(AtomicU16::new(200));
    let health_url = spawn_health_server(Arc::clone(&health_status)).await;

    let mut cfg = OnDemandConfig {
        agent: "test".to_string(),
        container_name: "test-svc".to_string(),
        hostname: "test.example.com".to_string(),
        health_url,
        check_interval: Duration::from_millis(50),
        startup_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_millis(150),
        wake_cooldown: Duration::from_secs(1),
        max_failures: 3,
        max_restart_attempts: 2,
        stop_grace: Duration::from_secs(1),
    };
    tweak(&mut cfg);

    let driver = MockDriver::new(initial);
    let activity = Arc::new(ActivityTracker::new());
    let emitter = Emitter::new(64);
    let events = emitter.subscribe();

    let controller = Arc::new(
        OnDemand::new(
            Arc::clone(&driver) as Arc<dyn LifecycleDriver>,
            cfg,
            Arc::clone(&activity),
            emitter,
        )
        .unwrap(),
    );
    controller.set_initial_state(initial_running);

    let shutdown = CancellationToken::new();
    let runner = Arc::clone(&controller);
    let token = shutdown.clone();
    tokio::spawn(async move {
        runner.run_loop(token).await;
    });

    Harness {
        controller,
        driver,
        activity,
        health_status,
        events,
        shutdown,
    }
}

async fn wait_for_state(controller: &OnDemand, want: AgentState, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let state = controller.current_state();
        if state == want {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {want}, state = {state}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_event(events: &mut EventReceiver, want: EventKind, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(!remaining.is_zero(), "timed out waiting for event {want}");
        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Some(event)) if event.kind == want => return,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("event bus closed while waiting for {want}"),
            Err(_) => panic!("timed out waiting for event {want}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wake_cooldown_gates_requests() {
    let h = start_harness(ContainerStatus::Exited, false, |_| {}).await;

    // set_initial_state(false) armed the cooldown at boot; wait it out.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    h.controller.notify_request();
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;

    // Idle out back to sleeping.
    wait_for_state(&h.controller, AgentState::Sleeping, Duration::from_secs(3)).await;
    let starts = h.driver.starts();

    // A wake inside the cooldown window must not reach the driver.
    h.controller.notify_request();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.driver.starts(), starts, "wake during cooldown must not start the container");
    assert_eq!(h.controller.current_state(), AgentState::Sleeping);

    // After the cooldown, the same request goes through.
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.notify_request();
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;
    assert_eq!(h.driver.starts(), starts + 1);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_zero_cooldown_allows_immediate_rewake() {
    let h = start_harness(ContainerStatus::Exited, false, |cfg| {
        cfg.wake_cooldown = Duration::ZERO;
    })
    .await;

    h.controller.notify_request();
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;
    wait_for_state(&h.controller, AgentState::Sleeping, Duration::from_secs(3)).await;

    // Immediate re-wake with zero cooldown must succeed.
    h.controller.notify_request();
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;
    assert_eq!(h.driver.starts(), 2);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_startup_timeout_restarts_then_degrades() {
    let mut h = start_harness(ContainerStatus::Exited, false, |cfg| {
        cfg.wake_cooldown = Duration::ZERO;
        cfg.startup_timeout = Duration::from_millis(300);
        cfg.max_restart_attempts = 2;
    })
    .await;
    // Backend never becomes healthy.
    h.health_status.store(500, Ordering::SeqCst);

    h.controller.notify_request();
    wait_for_state(&h.controller, AgentState::Waking, Duration::from_secs(1)).await;

    // First deadline spends a restart attempt, second exhausts the budget.
    wait_for_event(&mut h.events, EventKind::RestartAttempt, Duration::from_secs(2)).await;
    wait_for_event(&mut h.events, EventKind::Degraded, Duration::from_secs(2)).await;
    assert_eq!(h.controller.current_state(), AgentState::Degraded);
    assert_eq!(h.driver.starts(), 2, "one wake start plus one restart start");

    // Degraded is sticky while the probe keeps failing: no more starts.
    let starts = h.driver.starts();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.driver.starts(), starts);

    // A successful probe recovers the episode.
    h.health_status.store(200, Ordering::SeqCst);
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(2)).await;
    assert_eq!(h.controller.snapshot().restart_attempts, 0);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_boot_with_running_container_needs_no_start() {
    let h = start_harness(ContainerStatus::Running, true, |cfg| {
        // Generous idle timeout so the agent stays up for the assertion.
        cfg.idle_timeout = Duration::from_secs(60);
    })
    .await;

    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;
    assert_eq!(h.driver.starts(), 0, "healthy boot must not call start");
    assert_eq!(h.controller.snapshot().restart_attempts, 0);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_live_connections_inhibit_idle_sleep() {
    let h = start_harness(ContainerStatus::Running, true, |_| {}).await;
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;

    let guard = h.activity.connection_guard();

    // Well past the idle timeout, but the connection pins the agent up.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.controller.current_state(), AgentState::Ready);
    assert_eq!(h.driver.stops(), 0);

    // Once the connection ends, idle sleep fires on a following tick.
    drop(guard);
    wait_for_state(&h.controller, AgentState::Sleeping, Duration::from_secs(3)).await;
    assert_eq!(h.driver.stops(), 1);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drift_is_reconciled_by_stop() {
    let mut h = start_harness(ContainerStatus::Exited, false, |_| {}).await;
    assert_eq!(h.controller.current_state(), AgentState::Sleeping);

    // The runtime disagrees: container came up behind our back.
    h.driver.set_status(ContainerStatus::Running);

    wait_for_event(&mut h.events, EventKind::Stopping, Duration::from_secs(2)).await;
    wait_for_event(&mut h.events, EventKind::Sleeping, Duration::from_secs(2)).await;
    assert_eq!(h.controller.current_state(), AgentState::Sleeping);
    assert!(h.driver.stops() >= 1);
    // lastSleepTime was refreshed by the re-entry into sleeping.
    assert_eq!(h.controller.snapshot().seconds_since_sleep, Some(0));

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_request_storm_coalesces_to_one_start() {
    let h = start_harness(ContainerStatus::Exited, false, |cfg| {
        cfg.wake_cooldown = Duration::ZERO;
    })
    .await;

    for _ in 0..50 {
        h.controller.notify_request();
    }
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;
    assert_eq!(h.driver.starts(), 1, "a burst of requests must coalesce into one start");

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_admin_wake_bypasses_cooldown() {
    let h = start_harness(ContainerStatus::Exited, false, |cfg| {
        cfg.wake_cooldown = Duration::from_secs(60);
        cfg.idle_timeout = Duration::from_secs(60);
    })
    .await;

    // Cooldown armed at boot blocks request wakes entirely.
    h.controller.notify_request();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.controller.current_state(), AgentState::Sleeping);
    assert_eq!(h.driver.starts(), 0);

    // The admin wake goes through regardless.
    h.controller.wake();
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;

    // And the admin sleep brings it back down.
    h.controller.sleep();
    wait_for_state(&h.controller, AgentState::Sleeping, Duration::from_secs(3)).await;
    assert_eq!(h.driver.stops(), 1);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ready_probe_failures_trigger_restart() {
    let mut h = start_harness(ContainerStatus::Running, true, |cfg| {
        cfg.idle_timeout = Duration::from_secs(60);
        cfg.max_failures = 2;
    })
    .await;
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;

    // Backend collapses; two consecutive failures force a restart cycle.
    h.health_status.store(500, Ordering::SeqCst);
    wait_for_event(&mut h.events, EventKind::RestartAttempt, Duration::from_secs(2)).await;
    wait_for_event(&mut h.events, EventKind::Waking, Duration::from_secs(2)).await;
    assert!(h.driver.stops() >= 1);
    assert!(h.driver.starts() >= 1);

    // Recovery: backend is healthy again after the restart.
    h.health_status.store(200, Ordering::SeqCst);
    wait_for_state(&h.controller, AgentState::Ready, Duration::from_secs(3)).await;
    assert_eq!(h.controller.snapshot().restart_attempts, 0);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_resolves_from_runtime_view() {
    // No set_initial_state call at all: the first tick must resolve the
    // state from the driver.
    let health_status = Arc::new(AtomicU16::new(200));
    let health_url = spawn_health_server(Arc::clone(&health_status)).await;

    let driver = MockDriver::new(ContainerStatus::Running);
    let activity = Arc::new(ActivityTracker::new());
    let controller = Arc::new(
        OnDemand::new(
            Arc::clone(&driver) as Arc<dyn LifecycleDriver>,
            OnDemandConfig {
                agent: "test".to_string(),
                health_url,
                check_interval: Duration::from_millis(50),
                idle_timeout: Duration::from_secs(60),
                ..Default::default()
            },
            activity,
            Emitter::new(64),
        )
        .unwrap(),
    );
    assert_eq!(controller.current_state(), AgentState::Unknown);

    let shutdown = CancellationToken::new();
    let runner = Arc::clone(&controller);
    let token = shutdown.clone();
    tokio::spawn(async move { runner.run_loop(token).await });

    wait_for_state(&controller, AgentState::Ready, Duration::from_secs(3)).await;
    assert_eq!(driver.starts(), 0);

    shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_failures_exhaust_restart_budget() {
    let mut h = start_harness(ContainerStatus::Exited, false, |cfg| {
        cfg.wake_cooldown = Duration::ZERO;
        cfg.max_restart_attempts = 2;
    })
    .await;
    h.driver.fail_starts(true);
    h.health_status.store(500, Ordering::SeqCst);

    h.controller.notify_request();

    // Each failed start spends one attempt; the second failure degrades.
    wait_for_event(&mut h.events, EventKind::Degraded, Duration::from_secs(2)).await;
    assert_eq!(h.controller.current_state(), AgentState::Degraded);
    assert_eq!(h.driver.starts(), 2);

    // No further start attempts while degraded.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.driver.starts(), 2);

    h.shutdown.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejects_invalid_configuration() {
    let driver = MockDriver::new(ContainerStatus::Exited);
    let result = OnDemand::new(
        Arc::clone(&driver) as Arc<dyn LifecycleDriver>,
        OnDemandConfig {
            agent: "bad".to_string(),
            idle_timeout: Duration::ZERO,
            ..Default::default()
        },
        Arc::new(ActivityTracker::new()),
        Emitter::new(4),
    );
    assert!(result.is_err(), "zero idle_timeout must be rejected at construction");
}
