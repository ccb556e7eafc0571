//! Correlation context threaded through every fabric invocation
//!
//! No thread-locals and no global holders: the fabric constructs a context
//! at every task boundary it owns (outbox tick, inbound delivery, inbox
//! replay) and passes it explicitly into listeners and handlers.

use uuid::Uuid;

/// Per-logical-task context carried alongside every event
///
/// The correlation id is an opaque token linking the entire chain of work
/// across module boundaries. The two replay flags tell listeners whether
/// they are seeing a first delivery or a re-dispatch, so side-effecting
/// translators can skip themselves on replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    correlation_id: String,
    is_inbox_replay: bool,
    is_outbox_replay: bool,
}

impl CorrelationContext {
    /// Fresh context with a new correlation id and both replay flags false
    ///
    /// Used when a task starts with no inherited context (HTTP request,
    /// scheduled tick, CLI invocation).
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            is_inbox_replay: false,
            is_outbox_replay: false,
        }
    }

    /// Context for the initial delivery of an inbound integration event
    ///
    /// Inherits the event's correlation id; `is_inbox_replay` stays false.
    pub fn for_inbound(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            is_inbox_replay: false,
            is_outbox_replay: false,
        }
    }

    /// The correlation id linking this chain of work
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// True when the current invocation is an inbox replay tick
    pub fn is_inbox_replay(&self) -> bool {
        self.is_inbox_replay
    }

    /// True when the outbox processor is re-publishing a previously
    /// attempted row
    pub fn is_outbox_replay(&self) -> bool {
        self.is_outbox_replay
    }

    /// Copy of this context with `is_inbox_replay` set
    ///
    /// Overrides compose by replacement: the other fields carry over
    /// unchanged, and applying the same override twice is a no-op.
    pub fn inbox_replay(&self) -> Self {
        Self {
            is_inbox_replay: true,
            ..self.clone()
        }
    }

    /// Copy of this context with `is_outbox_replay` set
    pub fn outbox_replay(&self) -> Self {
        Self {
            is_outbox_replay: true,
            ..self.clone()
        }
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}
