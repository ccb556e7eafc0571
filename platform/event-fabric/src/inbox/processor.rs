//! Inbox replay processor and retention sweeper
//!
//! Re-dispatches inbox rows flagged `replay_required` under a context with
//! `is_inbox_replay = true`. Reconstructive listeners run again; purely
//! side-effecting translators see the flag and skip themselves, which is
//! exactly the duplicate-processing hole this loop exists to close.
//!
//! The same tick truncates PROCESSED rows past the retention window.

use super::{InboxStore, ListenerRegistry};
use crate::config::InboxConfig;
use crate::context::CorrelationContext;
use crate::error::FabricError;
use crate::metrics::FabricMetrics;
use chrono::Utc;
use event_bus::consumer_retry::RetryConfig;
use event_bus::IntegrationEnvelope;
use std::sync::Arc;
use tokio::sync::watch;

const REPLAY_BATCH: i64 = 100;

/// Background task replaying flagged inbox rows
pub struct InboxProcessor {
    inbox: Arc<dyn InboxStore>,
    registry: Arc<ListenerRegistry>,
    config: InboxConfig,
    retry: RetryConfig,
    metrics: Option<FabricMetrics>,
}

impl InboxProcessor {
    pub fn new(
        inbox: Arc<dyn InboxStore>,
        registry: Arc<ListenerRegistry>,
        config: InboxConfig,
    ) -> Self {
        Self {
            inbox,
            registry,
            config,
            retry: RetryConfig::default(),
            metrics: None,
        }
    }

    /// Override the per-listener retry schedule used during replay
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Attach Prometheus metrics updated every tick
    pub fn with_metrics(mut self, metrics: FabricMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run until the shutdown flag flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            replay_enabled = self.config.replay_enabled,
            "Inbox processor starting"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(replayed) if replayed > 0 => {
                            tracing::debug!(replayed = replayed, "Inbox rows replayed");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Inbox tick failed");
                        }
                    }

                    if let Some(metrics) = &self.metrics {
                        if let Ok(stats) = self.inbox.stats().await {
                            metrics.inbox_pending.set(stats.pending);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("Inbox processor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Replay one batch and sweep retention; returns rows replayed
    pub async fn tick(&self) -> Result<usize, FabricError> {
        let mut replayed = 0;

        if self.config.replay_enabled {
            let due = self.inbox.due_for_replay(REPLAY_BATCH).await?;

            for row in due {
                let envelope: IntegrationEnvelope<serde_json::Value> =
                    match serde_json::from_value(row.payload.clone()) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            // A stored payload that no longer parses will
                            // never replay; quarantine instead of looping
                            tracing::error!(
                                event_id = %row.event_id,
                                error = %e,
                                "Stored inbox payload unparseable, quarantining"
                            );
                            self.inbox.quarantine(row.event_id, &e.to_string()).await?;
                            continue;
                        }
                    };

                let ctx = CorrelationContext::for_inbound(envelope.correlation_id.clone())
                    .inbox_replay();

                match self.registry.deliver(&envelope, &ctx, &self.retry).await {
                    Ok(()) => {
                        self.inbox.mark_replay_done(row.event_id).await?;
                        replayed += 1;
                        tracing::info!(
                            event_id = %row.event_id,
                            event_type = %row.event_type,
                            correlation_id = %envelope.correlation_id,
                            "Inbox row replayed"
                        );
                    }
                    Err(e) => {
                        if let Some(metrics) = &self.metrics {
                            metrics.listener_failures_total.inc();
                        }
                        let attempt = self
                            .inbox
                            .mark_failed(row.event_id, &e.to_string())
                            .await?;
                        tracing::error!(
                            event_id = %row.event_id,
                            attempt = attempt,
                            error = %e,
                            "Inbox replay failed"
                        );
                    }
                }
            }
        }

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention).unwrap_or_default();
        let purged = self.inbox.purge_processed(cutoff).await?;
        if purged > 0 {
            tracing::debug!(purged = purged, "Expired inbox rows truncated");
        }

        Ok(replayed)
    }
}
