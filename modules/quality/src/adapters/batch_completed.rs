//! Adapter: ingestion's batch.completed → local quality.batch.received
//!
//! Pure field mapping; the replay skip lives in the fabric's
//! `IntegrationAdapter` wrapper. Downstream handlers never see the
//! foreign envelope.

use crate::domain;
use event_fabric::{DomainBus, IntegrationAdapter};
use std::sync::Arc;

/// Build the adapter translating inbound batch completions
pub fn batch_completed_adapter(bus: Arc<DomainBus>) -> IntegrationAdapter {
    IntegrationAdapter::new("batch_completed_adapter", bus, |envelope| {
        // The inbound payload already carries exactly the fields the
        // local event needs; translation is a re-tag, not a reshape
        let ctx = event_fabric::CorrelationContext::for_inbound(envelope.correlation_id.clone());
        Ok(domain::batch_received(&ctx, envelope.payload.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use event_bus::IntegrationEnvelope;
    use event_fabric::inbox::IntegrationEventListener;
    use event_fabric::{
        CorrelationContext, DeliveryMode, DomainEvent, DomainEventHandler, EmitSink, FabricResult,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Capture {
        calls: AtomicUsize,
        last_type: Mutex<Option<String>>,
    }

    #[async_trait]
    impl DomainEventHandler for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn handle(
            &self,
            event: &DomainEvent,
            _ctx: &CorrelationContext,
            _sink: &EmitSink,
        ) -> FabricResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_type.lock().unwrap() = Some(event.event_type.clone());
            Ok(())
        }
    }

    fn envelope() -> IntegrationEnvelope<serde_json::Value> {
        IntegrationEnvelope::new(
            "batch.completed",
            "ingestion",
            1,
            "corr-adapter-test",
            json!({
                "batchId": "B-9",
                "sourceSystem": "core-banking",
                "recordCount": 10,
                "completedAt": "2026-03-01T12:00:00Z"
            }),
        )
    }

    #[tokio::test]
    async fn test_translates_to_local_domain_event() {
        let capture = Arc::new(Capture {
            calls: AtomicUsize::new(0),
            last_type: Mutex::new(None),
        });
        let mut bus = DomainBus::new();
        bus.subscribe(
            domain::BATCH_RECEIVED,
            DeliveryMode::Transactional,
            capture.clone(),
        );

        let adapter = batch_completed_adapter(Arc::new(bus));
        let ctx = CorrelationContext::for_inbound("corr-adapter-test");

        adapter.on_event(&envelope(), &ctx).await.unwrap();

        assert_eq!(capture.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            capture.last_type.lock().unwrap().as_deref(),
            Some(domain::BATCH_RECEIVED)
        );
    }

    #[tokio::test]
    async fn test_skips_on_inbox_replay() {
        let capture = Arc::new(Capture {
            calls: AtomicUsize::new(0),
            last_type: Mutex::new(None),
        });
        let mut bus = DomainBus::new();
        bus.subscribe(
            domain::BATCH_RECEIVED,
            DeliveryMode::Transactional,
            capture.clone(),
        );

        let adapter = batch_completed_adapter(Arc::new(bus));
        let ctx = CorrelationContext::for_inbound("corr-adapter-test").inbox_replay();

        adapter.on_event(&envelope(), &ctx).await.unwrap();

        assert_eq!(
            capture.calls.load(Ordering::SeqCst),
            0,
            "adapter must not re-emit on replay"
        );
    }
}
