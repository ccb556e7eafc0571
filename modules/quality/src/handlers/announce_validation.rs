//! After-commit listener announcing validation start on the platform bus
//!
//! Runs on `quality.validation.requested` once the registering
//! transaction committed. The announcement must survive a crash, so the
//! effect is elevated to an outbox row rather than published directly.

use crate::contracts::{
    QualityValidationStartedV1, QUALITY_VALIDATION_STARTED_SCHEMA_VERSION,
    QUALITY_VALIDATION_STARTED_TYPE,
};
use async_trait::async_trait;
use chrono::Utc;
use event_bus::IntegrationEnvelope;
use event_fabric::outbox::OutboxAppend;
use event_fabric::{
    stage_integration_event, CorrelationContext, DomainEvent, DomainEventHandler, EmitSink,
    FabricError, FabricResult,
};
use std::sync::Arc;

pub struct AnnounceValidationStart {
    outbox: Arc<dyn OutboxAppend>,
}

impl AnnounceValidationStart {
    pub fn new(outbox: Arc<dyn OutboxAppend>) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl DomainEventHandler for AnnounceValidationStart {
    fn name(&self) -> &str {
        "announce_validation_start"
    }

    async fn handle(
        &self,
        event: &DomainEvent,
        ctx: &CorrelationContext,
        _sink: &EmitSink,
    ) -> FabricResult<()> {
        let batch_id = event
            .payload
            .get("batchId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FabricError::Schema("missing batchId".into()))?
            .to_string();
        let record_count = event
            .payload
            .get("recordCount")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let envelope = IntegrationEnvelope::new(
            QUALITY_VALIDATION_STARTED_TYPE,
            "quality",
            QUALITY_VALIDATION_STARTED_SCHEMA_VERSION,
            ctx.correlation_id(),
            QualityValidationStartedV1 {
                batch_id: batch_id.clone(),
                record_count,
                started_at: Utc::now().to_rfc3339(),
            },
        );
        let staged = stage_integration_event(&envelope, Some(batch_id.clone()))?;

        self.outbox.append(vec![staged]).await?;

        tracing::info!(
            batch_id = %batch_id,
            event_id = %envelope.event_id,
            correlation_id = %ctx.correlation_id(),
            "Validation start announced via outbox"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain;
    use event_fabric::outbox::MemoryOutboxStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_announcement_lands_in_outbox() {
        let outbox = MemoryOutboxStore::new();
        let handler = AnnounceValidationStart::new(Arc::new(outbox.clone()));
        let ctx = CorrelationContext::for_inbound("corr-announce");

        let event = domain::validation_requested(
            &ctx,
            json!({"batchId": "B-5", "recordCount": 9}),
        );

        // Dispatch through a bus so the handler runs exactly as wired
        let mut bus = event_fabric::DomainBus::new();
        bus.subscribe(
            domain::VALIDATION_REQUESTED,
            event_fabric::DeliveryMode::Transactional,
            Arc::new(handler),
        );
        bus.dispatch(event, &ctx).await.unwrap();

        let rows = outbox.all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "quality.validation.started");
        assert_eq!(rows[0].aggregate_key.as_deref(), Some("B-5"));
        assert_eq!(rows[0].payload["correlationId"], "corr-announce");
        assert_eq!(rows[0].payload["payload"]["batchId"], "B-5");
    }
}
