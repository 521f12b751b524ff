// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod alerts;
pub mod always_on;
pub mod on_demand;
pub mod registry;
pub mod unmanaged;

pub use alerts::WebhookAlerter;
pub use always_on::{AlwaysOn, AlwaysOnConfig};
pub use on_demand::{OnDemand, OnDemandConfig, OnDemandSnapshot};
pub use registry::{Registry, RegistryError, Service};
pub use unmanaged::Unmanaged;
