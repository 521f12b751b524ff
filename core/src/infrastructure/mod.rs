// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod docker;
pub mod event_bus;
pub mod health;

pub use docker::DockerLifecycle;
pub use event_bus::Emitter;
pub use health::HealthChecker;
