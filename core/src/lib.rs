// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Warren orchestrator core.
//!
//! Fronts a fleet of HTTP backend agents (long-running containers) behind a
//! reverse proxy and decides, per agent, whether its container should be
//! running, sleeping, or kept always-up.
//!
//! # Architecture
//!
//! - **domain:** state machine vocabulary, collaborator traits, config
//! - **application:** lifecycle policies, registry, webhook alerter
//! - **infrastructure:** Docker driver, health prober, event bus
//! - **presentation:** reverse proxy and admin HTTP surfaces

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;
pub mod security;

pub use domain::*;
