//! Scheduled outbox drain: claim, publish, mark
//!
//! One processor per module process. Several processes may run the same
//! module concurrently; claim leases keep them from double-publishing
//! except when a processor dies mid-publish, in which case the lease
//! expires and the row is redelivered. That redelivery is the at-least-once
//! in "at-least-once + idempotent consumers": the downstream inbox dedupes
//! on event id.

use super::{OutboxMessage, OutboxStore};
use crate::config::{BusConfig, OutboxConfig};
use crate::context::CorrelationContext;
use crate::error::FabricError;
use crate::metrics::FabricMetrics;
use chrono::Utc;
use event_bus::EventBus;
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Background task that drains the outbox to the cross-module bus
pub struct OutboxProcessor {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    /// Subject prefix for this module's events (e.g., "ingestion.events");
    /// the published subject is `{prefix}.{event_type}`
    subject_prefix: String,
    outbox: OutboxConfig,
    bus_config: BusConfig,
    metrics: Option<FabricMetrics>,
    shutdown: watch::Receiver<bool>,
}

impl OutboxProcessor {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        bus: Arc<dyn EventBus>,
        subject_prefix: impl Into<String>,
        outbox: OutboxConfig,
        bus_config: BusConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            bus,
            subject_prefix: subject_prefix.into(),
            outbox,
            bus_config,
            metrics: None,
            shutdown,
        }
    }

    /// Attach Prometheus metrics updated every tick
    pub fn with_metrics(mut self, metrics: FabricMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until the shutdown flag flips
    ///
    /// In-flight publishes finish before the loop exits; anything still
    /// PROCESSING afterwards ages out of its lease and is re-claimed by
    /// the next processor.
    pub async fn run(mut self) {
        tracing::info!(
            subject_prefix = %self.subject_prefix,
            poll_interval_ms = self.outbox.poll_interval.as_millis() as u64,
            batch_size = self.outbox.batch_size,
            max_attempts = self.outbox.max_attempts,
            "Outbox processor starting"
        );

        let mut interval = tokio::time::interval(self.outbox.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(count) if count > 0 => {
                            tracing::debug!(count = count, "Outbox batch drained");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Outbox tick failed");
                        }
                    }

                    if let Some(metrics) = &self.metrics {
                        if let Ok(stats) = self.store.stats().await {
                            metrics.outbox_pending.set(stats.pending);
                            metrics.outbox_processing.set(stats.processing);
                        }
                    }
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!(
                            subject_prefix = %self.subject_prefix,
                            "Outbox processor shutting down"
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Claim and publish one batch; returns the number of rows claimed
    pub async fn tick(&self) -> Result<usize, FabricError> {
        let claimed = self
            .store
            .claim(self.outbox.batch_size, self.outbox.lease)
            .await?;
        let count = claimed.len();

        stream::iter(claimed)
            .for_each_concurrent(self.bus_config.worker_concurrency, |msg| async move {
                self.publish_one(msg).await;
            })
            .await;

        Ok(count)
    }

    async fn publish_one(&self, msg: OutboxMessage) {
        let correlation_id = msg
            .payload
            .get("correlationId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mut ctx = CorrelationContext::for_inbound(correlation_id);
        if msg.attempt > 0 {
            ctx = ctx.outbox_replay();
        }

        let subject = format!("{}.{}", self.subject_prefix, msg.event_type);

        let bytes = match serde_json::to_vec(&msg.payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(&msg, FabricError::Schema(e.to_string())).await;
                return;
            }
        };

        let result = tokio::time::timeout(
            self.bus_config.publish_timeout,
            self.bus.publish(&subject, bytes),
        )
        .await;

        let outcome = match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(bus_err)) => Err(FabricError::from(bus_err)),
            Err(_) => Err(FabricError::Transient(format!(
                "publish timed out after {:?}",
                self.bus_config.publish_timeout
            ))),
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = self.store.mark_processed(msg.id).await {
                    // The event reached the bus; the inbox dedupe absorbs
                    // the redelivery this marking failure will cause.
                    tracing::error!(
                        event_id = %msg.id,
                        error = %e,
                        "Failed to mark published event as processed"
                    );
                    return;
                }

                if let Some(metrics) = &self.metrics {
                    metrics.outbox_processed_total.inc();
                }

                tracing::info!(
                    event_id = %msg.id,
                    event_type = %msg.event_type,
                    subject = %subject,
                    correlation_id = %ctx.correlation_id(),
                    outbox_replay = ctx.is_outbox_replay(),
                    "Event published"
                );
            }
            Err(e) => self.fail(&msg, e).await,
        }
    }

    async fn fail(&self, msg: &OutboxMessage, error: FabricError) {
        let attempts_made = msg.attempt + 1;
        let exhausted = attempts_made >= self.outbox.max_attempts;

        if !error.is_retryable() || exhausted {
            tracing::error!(
                event_id = %msg.id,
                event_type = %msg.event_type,
                attempt = attempts_made,
                error = %error,
                exhausted = exhausted,
                "Outbox row moved to FAILED, operator reset required"
            );

            if let Err(mark_err) = self
                .store
                .mark_terminally_failed(msg.id, &error.to_string())
                .await
            {
                tracing::error!(event_id = %msg.id, error = %mark_err, "Failed to mark row FAILED");
            } else if let Some(metrics) = &self.metrics {
                metrics.outbox_failed_total.inc();
            }
            return;
        }

        let delay = jittered(backoff_delay(&self.outbox, msg.attempt));
        let next_attempt_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();

        tracing::warn!(
            event_id = %msg.id,
            event_type = %msg.event_type,
            attempt = attempts_made,
            backoff_ms = delay.as_millis() as u64,
            error = %error,
            "Publish failed, retry scheduled"
        );

        if let Err(mark_err) = self
            .store
            .mark_failed(msg.id, &error.to_string(), next_attempt_at)
            .await
        {
            tracing::error!(event_id = %msg.id, error = %mark_err, "Failed to record publish failure");
        }
    }
}

/// Exponential backoff before jitter: `min(base * 2^attempt, max)`
///
/// `attempt` is the number of failures already recorded, so the first
/// retry waits the base backoff.
pub fn backoff_delay(config: &OutboxConfig, attempt: i32) -> Duration {
    let exponent = attempt.clamp(0, 30) as u32;
    let factor = 2u128.saturating_pow(exponent);
    let millis = (config.base_backoff.as_millis().saturating_mul(factor))
        .min(config.max_backoff.as_millis());
    Duration::from_millis(millis as u64)
}

/// Add up to 25% random jitter so synchronized processors fan out
fn jittered(delay: Duration) -> Duration {
    let max_jitter = (delay.as_millis() / 4) as u64;
    if max_jitter == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}
