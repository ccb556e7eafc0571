//! Transactional outbox: durable buffer of integration events pending
//! cross-module publication
//!
//! The outbox is owned by the producing module. Rows are appended inside
//! the business transaction (both commit or neither; that atomicity is
//! the entire reason the outbox exists) and drained to the bus by the
//! [`processor::OutboxProcessor`].
//!
//! ## Status machine
//!
//! ```text
//! PENDING --claim--> PROCESSING --success--> PROCESSED (terminal)
//! PROCESSING --retryable fail--> PENDING (attempt+1, next_attempt_at set)
//! PROCESSING --non-retryable fail / attempts >= max--> FAILED (terminal)
//! PROCESSING --lease expired--> re-claimable (attempt+1)
//! FAILED --operator reset--> PENDING (attempt = 0)
//! ```
//!
//! ## Ordering
//!
//! Within one `aggregate_key` only the earliest unfinished row is
//! claimable, so per-key delivery follows `occurred_at` order even across
//! retries. Rows without an aggregate key have no ordering constraint.

pub mod memory;
pub mod postgres;
pub mod processor;

pub use memory::{MemoryOutboxStore, MemoryOutboxTx};
pub use postgres::{append_in_tx, PgOutboxStore};

use crate::error::{FabricError, FabricResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_bus::IntegrationEnvelope;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Outbox row lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Processing => "PROCESSING",
            OutboxStatus::Processed => "PROCESSED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> FabricResult<Self> {
        match raw {
            "PENDING" => Ok(OutboxStatus::Pending),
            "PROCESSING" => Ok(OutboxStatus::Processing),
            "PROCESSED" => Ok(OutboxStatus::Processed),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(FabricError::Schema(format!(
                "unknown outbox status '{}'",
                other
            ))),
        }
    }
}

/// A durable outbox row
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    /// Row id; equals the integration event id
    pub id: Uuid,
    /// Optional partition key preserving per-entity ordering
    pub aggregate_key: Option<String>,
    /// Integration event type
    pub event_type: String,
    /// Serialized wire envelope
    pub payload: serde_json::Value,
    /// When the producing aggregate raised the event
    pub occurred_at: DateTime<Utc>,
    pub status: OutboxStatus,
    /// Completed publish attempts
    pub attempt: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest instant the row becomes claimable again
    pub next_attempt_at: DateTime<Utc>,
    /// PROCESSING rows past this instant are re-claimable
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A staged row ready for transactional append
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub id: Uuid,
    pub aggregate_key: Option<String>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

/// Serialize an integration envelope into a staged outbox row
///
/// The row id is the envelope's event id, so the consumer-side dedupe key
/// and the outbox row key are the same value end to end.
pub fn stage_integration_event<T: Serialize>(
    envelope: &IntegrationEnvelope<T>,
    aggregate_key: Option<String>,
) -> FabricResult<NewOutboxMessage> {
    let payload = serde_json::to_value(envelope)?;

    Ok(NewOutboxMessage {
        id: envelope.event_id,
        aggregate_key,
        event_type: envelope.event_type.clone(),
        payload,
        occurred_at: envelope.occurred_at,
    })
}

/// Aggregate counters for metrics and the health signal
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxStats {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    /// Age in seconds of the oldest PENDING row; 0 when none pending
    pub oldest_pending_age_secs: i64,
    /// Age in seconds of the oldest FAILED row; 0 when none failed
    pub oldest_failed_age_secs: i64,
}

/// Processor-facing outbox operations
///
/// Producer-side append is deliberately NOT on this trait: it must join
/// the caller's transaction, so each implementation exposes its own append
/// ([`postgres::append_in_tx`] for sqlx transactions,
/// [`MemoryOutboxStore::begin`] for the in-memory twin).
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Atomically claim up to `max_n` due rows, marking them PROCESSING
    /// with a lease
    ///
    /// Safe under concurrent processors: two callers never receive the
    /// same row. Re-claiming a row whose lease expired increments its
    /// attempt counter.
    async fn claim(&self, max_n: i64, lease: Duration) -> FabricResult<Vec<OutboxMessage>>;

    /// Transition a PROCESSING row to PROCESSED
    ///
    /// Also bumps `attempt` so the counter reflects every publish attempt
    /// including the one that succeeded.
    async fn mark_processed(&self, id: Uuid) -> FabricResult<()>;

    /// Record a retryable failure: attempt+1, back to PENDING, next
    /// attempt scheduled
    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> FabricResult<()>;

    /// Record a terminal failure: attempt+1, FAILED, operator action required
    async fn mark_terminally_failed(&self, id: Uuid, error: &str) -> FabricResult<()>;

    /// Admin reset: every FAILED row back to PENDING with attempt = 0
    ///
    /// Returns the number of rows reset.
    async fn reset_failed(&self) -> FabricResult<u64>;

    /// Truncate PROCESSED rows older than the cutoff; returns rows removed
    async fn purge_processed(&self, older_than: DateTime<Utc>) -> FabricResult<u64>;

    /// Aggregate counters for metrics and health
    async fn stats(&self) -> FabricResult<OutboxStats>;
}

/// Non-transactional append for durable effects raised outside a business
/// transaction (e.g., after-commit listeners elevating an effect to the
/// outbox)
#[async_trait]
pub trait OutboxAppend: Send + Sync {
    async fn append(&self, rows: Vec<NewOutboxMessage>) -> FabricResult<()>;
}
