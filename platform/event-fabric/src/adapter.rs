//! Integration adapter: foreign integration event → local domain event
//!
//! The translation layer that keeps bounded contexts isolated. Downstream
//! handlers only ever see local domain events; foreign wire schemas stop
//! here. The adapter maps fields and nothing else; business logic lives
//! in the handlers behind the domain bus.
//!
//! Adapters MUST skip themselves on inbox replay: the local domain event
//! they would emit is exactly what the replay path re-dispatches, and
//! emitting it twice is the documented duplicate-processing bug this
//! design eliminates.

use crate::context::CorrelationContext;
use crate::domain_bus::DomainBus;
use crate::error::FabricResult;
use crate::event::DomainEvent;
use crate::inbox::dispatcher::IntegrationEventListener;
use async_trait::async_trait;
use event_bus::IntegrationEnvelope;
use std::sync::Arc;

/// Pure mapping from a foreign envelope to a local domain event
pub type MapFn =
    dyn Fn(&IntegrationEnvelope<serde_json::Value>) -> FabricResult<DomainEvent> + Send + Sync;

/// An [`IntegrationEventListener`] that translates and re-dispatches
///
/// On initial delivery it maps the envelope and dispatches the resulting
/// domain event transactionally on the module's bus. On inbox replay it
/// returns early without side effects; the replay path re-dispatches the
/// stored event itself.
pub struct IntegrationAdapter {
    name: String,
    bus: Arc<DomainBus>,
    map: Box<MapFn>,
}

impl IntegrationAdapter {
    pub fn new(
        name: impl Into<String>,
        bus: Arc<DomainBus>,
        map: impl Fn(&IntegrationEnvelope<serde_json::Value>) -> FabricResult<DomainEvent>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            bus,
            map: Box::new(map),
        }
    }
}

#[async_trait]
impl IntegrationEventListener for IntegrationAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(
        &self,
        envelope: &IntegrationEnvelope<serde_json::Value>,
        ctx: &CorrelationContext,
    ) -> FabricResult<()> {
        if ctx.is_inbox_replay() {
            tracing::debug!(
                adapter = %self.name,
                event_id = %envelope.event_id,
                "Skipping translation on inbox replay"
            );
            return Ok(());
        }

        let event = (self.map)(envelope)?;

        tracing::debug!(
            adapter = %self.name,
            event_id = %envelope.event_id,
            domain_event_type = %event.event_type,
            "Translated integration event to domain event"
        );

        let batch = self.bus.dispatch(event, ctx).await?;
        // The listener invocation is the consumer's transaction scope;
        // reaching this point is the commit
        self.bus.flush_after_commit(batch);

        Ok(())
    }
}
