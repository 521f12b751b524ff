// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::AgentState;
use tokio_util::sync::CancellationToken;

/// Unmanaged policy: Warren routes to the backend and does nothing else.
/// Reported as permanently ready so the proxy forwards unconditionally.
pub struct Unmanaged;

#[async_trait::async_trait]
impl crate::domain::policy::AgentPolicy for Unmanaged {
    fn state(&self) -> AgentState {
        AgentState::Ready
    }

    fn on_request(&self) {}

    async fn run(&self, shutdown: CancellationToken) {
        shutdown.cancelled().await;
    }
}
