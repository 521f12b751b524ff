// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::time::Duration;
use thiserror::Error;

/// Per-probe timeout is the smaller of the policy's check interval and this
/// cap, so a probe never outlives the tick that issued it.
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("health check request failed: {0}")]
    Request(String),
    #[error("health check returned status {0}")]
    BadStatus(u16),
}

/// HTTP health prober. A 200-399 response is healthy; any other status,
/// transport error, or timeout is a failure.
#[derive(Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new() -> Self {
        // No global client timeout; each probe carries its own deadline.
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn probe_timeout(check_interval: Duration) -> Duration {
        check_interval.min(MAX_PROBE_TIMEOUT)
    }

    pub async fn check(&self, url: &str, timeout: Duration) -> Result<(), HealthError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| HealthError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(HealthError::BadStatus(status.as_u16()))
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_timeout_capped_at_five_seconds() {
        assert_eq!(
            HealthChecker::probe_timeout(Duration::from_millis(50)),
            Duration::from_millis(50)
        );
        assert_eq!(
            HealthChecker::probe_timeout(Duration::from_secs(30)),
            MAX_PROBE_TIMEOUT
        );
    }
}
