// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::config::WebhookConfig;
use crate::domain::events::Event;
use crate::infrastructure::event_bus::Emitter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

const JOB_QUEUE_CAPACITY: usize = 100;
const WORKER_COUNT: usize = 5;
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

struct WebhookJob {
    config: WebhookConfig,
    event: Event,
}

/// Delivers lifecycle events to configured webhook URLs.
///
/// Enqueueing is strictly non-blocking: when the bounded job queue is full
/// the event is dropped and logged, so a slow or dead webhook endpoint can
/// never back-pressure the event bus publishers.
pub struct WebhookAlerter {
    configs: Vec<WebhookConfig>,
    client: reqwest::Client,
    jobs_tx: mpsc::Sender<WebhookJob>,
    jobs_rx: Mutex<Option<mpsc::Receiver<WebhookJob>>>,
    dropped: AtomicU64,
}

impl WebhookAlerter {
    pub fn new(configs: Vec<WebhookConfig>) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        Self {
            configs,
            client: reqwest::Client::builder()
                .timeout(DELIVERY_TIMEOUT)
                .build()
                .unwrap_or_default(),
            jobs_tx,
            jobs_rx: Mutex::new(Some(jobs_rx)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Jobs dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Fans one event out to every matching webhook config, never blocking.
    pub fn handle_event(&self, event: &Event) {
        for config in &self.configs {
            if !matches(config, event) {
                continue;
            }
            let job = WebhookJob {
                config: config.clone(),
                event: event.clone(),
            };
            if self.jobs_tx.try_send(job).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event = %event.kind,
                    url = %config.url,
                    "webhook job queue full, dropping event"
                );
            }
        }
    }

    /// Subscribes to the emitter and launches the delivery worker pool.
    /// Call once; subsequent calls only re-subscribe the dispatcher.
    pub fn start(self: &Arc<Self>, emitter: &Emitter, shutdown: CancellationToken) {
        // Dispatcher: event bus -> bounded job queue.
        let alerter = Arc::clone(self);
        let mut receiver = emitter.subscribe();
        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => alerter.handle_event(&event),
                        None => break,
                    },
                }
            }
        });

        // Worker pool: job queue -> HTTP delivery. The receiver can only be
        // taken once; a second start() just re-subscribes the dispatcher.
        let Some(rx) = self.jobs_rx.try_lock().ok().and_then(|mut guard| guard.take()) else {
            return;
        };
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..WORKER_COUNT {
            let alerter = Arc::clone(self);
            let rx = Arc::clone(&rx);
            let token = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        _ = token.cancelled() => break,
                        job = async { rx.lock().await.recv().await } => job,
                    };
                    match job {
                        Some(job) => alerter.deliver(job).await,
                        None => break,
                    }
                }
            });
        }
    }

    async fn deliver(&self, job: WebhookJob) {
        let mut request = self
            .client
            .post(&job.config.url)
            .header("content-type", "application/json")
            .json(&job.event);
        for (key, value) in &job.config.headers {
            request = request.header(key, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_client_error() || response.status().is_server_error() => {
                warn!(
                    status = response.status().as_u16(),
                    url = %job.config.url,
                    "webhook returned non-success status"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, url = %job.config.url, "webhook request failed");
            }
        }
    }
}

fn matches(config: &WebhookConfig, event: &Event) -> bool {
    // No filter means all events.
    config.events.is_empty() || config.events.iter().any(|e| e == event.kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventKind;

    fn unreachable_webhook(events: Vec<String>) -> WebhookConfig {
        WebhookConfig {
            url: "http://unreachable.invalid/hook".to_string(),
            events,
            headers: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_bounded_queue_never_blocks_publisher() {
        // No workers running: jobs accumulate, excess is dropped, and the
        // producer side must complete promptly.
        let alerter = WebhookAlerter::new(vec![unreachable_webhook(vec![])]);

        let publish = async {
            for _ in 0..200 {
                alerter.handle_event(&Event::new(EventKind::Ready, "test"));
            }
        };
        tokio::time::timeout(Duration::from_secs(2), publish)
            .await
            .expect("enqueueing must not block when the queue is full");

        assert_eq!(alerter.dropped_count(), 100);
    }

    #[tokio::test]
    async fn test_event_filter() {
        let config = unreachable_webhook(vec!["agent.degraded".to_string()]);
        assert!(matches(&config, &Event::new(EventKind::Degraded, "a")));
        assert!(!matches(&config, &Event::new(EventKind::Ready, "a")));

        let all = unreachable_webhook(vec![]);
        assert!(matches(&all, &Event::new(EventKind::Ready, "a")));
    }

    #[tokio::test]
    async fn test_filtered_events_not_enqueued() {
        let alerter = WebhookAlerter::new(vec![unreachable_webhook(vec![
            "agent.degraded".to_string(),
        ])]);
        for _ in 0..150 {
            alerter.handle_event(&Event::new(EventKind::Ready, "test"));
        }
        assert_eq!(alerter.dropped_count(), 0);
    }
}
