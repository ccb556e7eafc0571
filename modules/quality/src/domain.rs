//! Local domain event vocabulary of the quality context
//!
//! These events never leave the module; they are routed by the in-process
//! domain bus. Payloads reuse the camelCase field names of the inbound
//! contracts so adapters stay pure field mapping.

use event_fabric::{CorrelationContext, DomainEvent};

/// A batch from ingestion was accepted into the quality pipeline
pub const BATCH_RECEIVED: &str = "quality.batch.received";

/// Validation should start for a registered batch
pub const VALIDATION_REQUESTED: &str = "quality.validation.requested";

/// Build the batch-received domain event from an inbound payload
pub fn batch_received(ctx: &CorrelationContext, payload: serde_json::Value) -> DomainEvent {
    DomainEvent::new(BATCH_RECEIVED, ctx, payload)
}

/// Build the validation-requested follow-up event
pub fn validation_requested(ctx: &CorrelationContext, payload: serde_json::Value) -> DomainEvent {
    DomainEvent::new(VALIDATION_REQUESTED, ctx, payload)
}
