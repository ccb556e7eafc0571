//! Inbound dispatcher: cross-module bus → inbox → local listeners
//!
//! The consumer-side edge of the fabric. Each received message is first
//! persisted to the inbox (dedupe on event id), then delivered to every
//! listener registered for its type. Listener registration is explicit at
//! startup; there is no reflection and no annotation scanning.

use crate::context::CorrelationContext;
use crate::error::{FabricError, FabricResult};
use crate::inbox::{InboxStore, InsertOutcome, NewInboxMessage};
use crate::metrics::FabricMetrics;
use async_trait::async_trait;
use event_bus::consumer_retry::{retry_with_backoff_if, RetryConfig};
use event_bus::{validate_envelope_fields, BusMessage, EventBus, IntegrationEnvelope};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

/// A consumer of inbound integration events
///
/// Implementations must be idempotent per event id: redelivery after a
/// crash or a failed sibling listener is part of the delivery contract.
#[async_trait]
pub trait IntegrationEventListener: Send + Sync {
    /// Stable name used in logs and retry context
    fn name(&self) -> &str;

    /// Handle one inbound event under the given context
    async fn on_event(
        &self,
        envelope: &IntegrationEnvelope<serde_json::Value>,
        ctx: &CorrelationContext,
    ) -> FabricResult<()>;
}

/// Startup-time registration of listeners by event type
///
/// Build the registry during module bootstrap, then share it between the
/// inbound dispatcher and the inbox replay processor so both deliver to
/// the same listener set.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, Vec<Arc<dyn IntegrationEventListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for an event type; order of registration is
    /// the order of delivery
    pub fn register(&mut self, event_type: &str, listener: Arc<dyn IntegrationEventListener>) {
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
    }

    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listeners
            .get(event_type)
            .map(|l| !l.is_empty())
            .unwrap_or(false)
    }

    /// Deliver the envelope to every listener for its type, each with
    /// consumer retry; the first exhausted listener aborts the delivery
    pub async fn deliver(
        &self,
        envelope: &IntegrationEnvelope<serde_json::Value>,
        ctx: &CorrelationContext,
        retry: &RetryConfig,
    ) -> FabricResult<()> {
        let Some(listeners) = self.listeners.get(&envelope.event_type) else {
            return Ok(());
        };

        for listener in listeners {
            retry_with_backoff_if(
                || listener.on_event(envelope, ctx),
                retry,
                |e: &FabricError| e.is_retryable(),
                listener.name(),
            )
            .await?;
        }

        Ok(())
    }
}

/// Background task receiving integration events for one module
pub struct InboundDispatcher {
    bus: Arc<dyn EventBus>,
    inbox: Arc<dyn InboxStore>,
    registry: Arc<ListenerRegistry>,
    /// Bus subject pattern this module consumes (e.g., "ingestion.events.>")
    subscription: String,
    retry: RetryConfig,
    quarantine_attempts: i32,
    metrics: Option<FabricMetrics>,
}

impl InboundDispatcher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        inbox: Arc<dyn InboxStore>,
        registry: Arc<ListenerRegistry>,
        subscription: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            inbox,
            registry,
            subscription: subscription.into(),
            retry: RetryConfig::default(),
            quarantine_attempts: 5,
            metrics: None,
        }
    }

    /// Override the per-listener retry schedule
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Failed redeliveries before a PENDING row is quarantined
    pub fn with_quarantine_attempts(mut self, attempts: i32) -> Self {
        self.quarantine_attempts = attempts;
        self
    }

    /// Attach Prometheus metrics
    pub fn with_metrics(mut self, metrics: FabricMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribe and dispatch until the shutdown flag flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut stream = match self.bus.subscribe(&self.subscription).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    subscription = %self.subscription,
                    error = %e,
                    "Failed to subscribe inbound dispatcher"
                );
                return;
            }
        };

        tracing::info!(subscription = %self.subscription, "Inbound dispatcher subscribed");

        loop {
            tokio::select! {
                maybe_msg = stream.next() => {
                    match maybe_msg {
                        Some(msg) => {
                            if let Err(e) = self.handle(&msg).await {
                                tracing::error!(
                                    subject = %msg.subject,
                                    error = %e,
                                    "Inbound delivery failed; bus redelivery will retry"
                                );
                            }
                        }
                        None => {
                            tracing::warn!(
                                subscription = %self.subscription,
                                "Inbound stream ended"
                            );
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!(
                            subscription = %self.subscription,
                            "Inbound dispatcher shutting down"
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Persist and dispatch a single bus message
    ///
    /// Public so tests and replay drills can push messages through the
    /// exact production path without a live bus.
    pub async fn handle(&self, msg: &BusMessage) -> FabricResult<()> {
        let raw: serde_json::Value = serde_json::from_slice(&msg.payload)?;
        validate_envelope_fields(&raw).map_err(FabricError::Contract)?;
        let envelope: IntegrationEnvelope<serde_json::Value> = serde_json::from_value(raw)?;

        let ctx = CorrelationContext::for_inbound(envelope.correlation_id.clone());

        let span = tracing::info_span!(
            "dispatch_inbound",
            event_id = %envelope.event_id,
            subject = %msg.subject,
            event_type = %envelope.event_type,
            correlation_id = %envelope.correlation_id,
            source_module = %envelope.source_module
        );

        self.dispatch(envelope, ctx).instrument(span).await
    }

    async fn dispatch(
        &self,
        envelope: IntegrationEnvelope<serde_json::Value>,
        ctx: CorrelationContext,
    ) -> FabricResult<()> {
        let stored = NewInboxMessage {
            event_id: envelope.event_id,
            source_module: envelope.source_module.clone(),
            event_type: envelope.event_type.clone(),
            payload: serde_json::to_value(&envelope)?,
            // New rows are not replay-flagged; replay is opt-in per row
            replay_required: false,
        };

        match self.inbox.insert_if_absent(stored).await? {
            InsertOutcome::Duplicate => {
                if let Some(metrics) = &self.metrics {
                    metrics.inbox_duplicates_total.inc();
                }

                // A redelivery of a row that never completed is the retry
                // path; a redelivery of a finished row is pure noise.
                let still_pending = matches!(
                    self.inbox.get(envelope.event_id).await?,
                    Some(row) if row.status == crate::inbox::InboxStatus::Pending
                );
                if !still_pending {
                    tracing::info!("Duplicate delivery ignored, no listener invoked");
                    return Ok(());
                }
                tracing::info!("Redelivery of pending row, re-running listeners");
            }
            InsertOutcome::Inserted => {}
        }

        if !self.registry.has_listeners(&envelope.event_type) {
            self.inbox.mark_skipped(envelope.event_id).await?;
            tracing::info!("No listener registered for event type, row skipped");
            return Ok(());
        }

        match self.registry.deliver(&envelope, &ctx, &self.retry).await {
            Ok(()) => {
                self.inbox.mark_processed(envelope.event_id).await?;
                tracing::info!("Inbound event processed");
                Ok(())
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.listener_failures_total.inc();
                }

                let attempt = self
                    .inbox
                    .mark_failed(envelope.event_id, &e.to_string())
                    .await?;

                if !e.is_retryable() || attempt >= self.quarantine_attempts {
                    self.inbox
                        .quarantine(envelope.event_id, &e.to_string())
                        .await?;
                    tracing::error!(
                        attempt = attempt,
                        error = %e,
                        "Inbox row quarantined, operator action required"
                    );
                } else {
                    tracing::warn!(
                        attempt = attempt,
                        error = %e,
                        "Listener failed, row stays PENDING for redelivery"
                    );
                }

                Err(e)
            }
        }
    }
}
