//! BatchCompleted V1, consumer-side copy of the ingestion contract
//!
//! Field names must match the producer's wire schema EXACTLY. Unknown
//! additive fields are ignored, which is what lets the producer evolve
//! the payload behind a schemaVersion bump.

use serde::{Deserialize, Serialize};

/// Event type tag as published by the ingestion module
pub const BATCH_COMPLETED_TYPE: &str = "batch.completed";

/// Payload of the batch.completed integration event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompletedV1 {
    pub batch_id: String,
    pub source_system: String,
    pub record_count: i64,
    pub completed_at: String,
}
