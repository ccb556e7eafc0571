//! Per-subscriber inbox: durable dedupe log of received integration events
//!
//! The inbox is owned by the consuming module and keyed by event id.
//! Inserting a duplicate is a no-op success; that single property turns
//! the bus's at-least-once delivery into at-most-one listener side-effect
//! per event, together with the listener-level idempotency layers.
//!
//! ## Status machine
//!
//! ```text
//! PENDING --listeners ok--> PROCESSED (terminal, subject to retention)
//! PENDING --listener fail--> PENDING (attempt+1; redelivery retries)
//! PENDING --attempts >= quarantine threshold--> FAILED (operator action)
//! PENDING --no listener registered--> SKIPPED
//! rows with replay_required: re-dispatched by the replay processor
//! ```

pub mod dispatcher;
pub mod memory;
pub mod postgres;
pub mod processor;

pub use dispatcher::{InboundDispatcher, IntegrationEventListener, ListenerRegistry};
pub use memory::MemoryInboxStore;
pub use postgres::PgInboxStore;

use crate::error::{FabricError, FabricResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Inbox row lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxStatus {
    Pending,
    Processed,
    Failed,
    Skipped,
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxStatus::Pending => "PENDING",
            InboxStatus::Processed => "PROCESSED",
            InboxStatus::Failed => "FAILED",
            InboxStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(raw: &str) -> FabricResult<Self> {
        match raw {
            "PENDING" => Ok(InboxStatus::Pending),
            "PROCESSED" => Ok(InboxStatus::Processed),
            "FAILED" => Ok(InboxStatus::Failed),
            "SKIPPED" => Ok(InboxStatus::Skipped),
            other => Err(FabricError::Schema(format!(
                "unknown inbox status '{}'",
                other
            ))),
        }
    }
}

/// A durable inbox row
#[derive(Debug, Clone)]
pub struct InboxMessage {
    /// Platform-unique event id, the dedupe key
    pub event_id: Uuid,
    pub source_module: String,
    pub event_type: String,
    /// The received wire envelope
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub status: InboxStatus,
    /// When true the replay processor re-dispatches this row
    pub replay_required: bool,
    pub attempt: i32,
    pub last_error: Option<String>,
}

/// A row to insert on first receipt
#[derive(Debug, Clone)]
pub struct NewInboxMessage {
    pub event_id: Uuid,
    pub source_module: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub replay_required: bool,
}

/// Outcome of an idempotent insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Aggregate counters for metrics and the health signal
#[derive(Debug, Clone, Copy, Default)]
pub struct InboxStats {
    pub pending: i64,
    pub failed: i64,
    /// Age in seconds of the oldest PENDING row; 0 when none pending
    pub oldest_pending_age_secs: i64,
}

/// Durable inbox operations
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Insert the row unless its event id already exists
    ///
    /// A duplicate is NOT an error; callers must treat it as success and
    /// skip every listener.
    async fn insert_if_absent(&self, msg: NewInboxMessage) -> FabricResult<InsertOutcome>;

    /// Transition to PROCESSED after every listener succeeded
    async fn mark_processed(&self, event_id: Uuid) -> FabricResult<()>;

    /// Record a listener failure; the row stays PENDING
    ///
    /// Returns the attempt count after the increment so the caller can
    /// decide on quarantine.
    async fn mark_failed(&self, event_id: Uuid, error: &str) -> FabricResult<i32>;

    /// Transition to SKIPPED (no listener registered for the type)
    async fn mark_skipped(&self, event_id: Uuid) -> FabricResult<()>;

    /// Quarantine a poison row: status FAILED, manual intervention
    async fn quarantine(&self, event_id: Uuid, error: &str) -> FabricResult<()>;

    /// Flag a row for re-dispatch by the replay processor
    async fn request_replay(&self, event_id: Uuid) -> FabricResult<()>;

    /// Clear the replay flag after a successful replay
    ///
    /// A PENDING row is additionally marked PROCESSED; an
    /// already-PROCESSED row keeps its status.
    async fn mark_replay_done(&self, event_id: Uuid) -> FabricResult<()>;

    /// Rows flagged for replay, in PENDING or PROCESSED status
    async fn due_for_replay(&self, max_n: i64) -> FabricResult<Vec<InboxMessage>>;

    /// Fetch one row (operational introspection)
    async fn get(&self, event_id: Uuid) -> FabricResult<Option<InboxMessage>>;

    /// Truncate PROCESSED rows older than the cutoff; returns rows removed
    ///
    /// The cutoff must stay beyond every upstream outbox retry horizon or
    /// a late redelivery will be seen as a brand new event.
    async fn purge_processed(&self, older_than: DateTime<Utc>) -> FabricResult<u64>;

    /// Aggregate counters for metrics and health
    async fn stats(&self) -> FabricResult<InboxStats>;
}
