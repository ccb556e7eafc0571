//! Event model: intra-module domain events
//!
//! Two disjoint families cross the fabric. A **domain event** stays inside
//! one bounded context and is routed purely in process by the
//! [`crate::DomainBus`]. An **integration event**
//! ([`event_bus::IntegrationEnvelope`]) crosses module boundaries with a
//! stable wire schema. The fabric never promotes one into the other; a
//! translator does that explicitly in each direction.

use crate::context::CorrelationContext;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A happening internal to one bounded context
///
/// Flat record, dispatched by its `event_type` string tag. The fabric
/// never persists domain events; durability is the outbox's job and only
/// integration events go there.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    /// Unique id of this event
    pub event_id: Uuid,
    /// Stable type tag used for in-process routing (e.g., "quality.batch.received")
    pub event_type: String,
    /// UTC instant the producing aggregate raised the event
    pub occurred_at: DateTime<Utc>,
    /// Correlation id inherited from the producing context
    pub correlation_id: String,
    /// Structured payload
    pub payload: serde_json::Value,
}

impl DomainEvent {
    /// Create a domain event under the given context
    ///
    /// The correlation id is inherited from `ctx`; id and timestamp are
    /// generated here.
    pub fn new(
        event_type: impl Into<String>,
        ctx: &CorrelationContext,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            correlation_id: ctx.correlation_id().to_string(),
            payload,
        }
    }
}
