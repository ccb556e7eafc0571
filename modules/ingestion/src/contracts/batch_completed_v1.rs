//! BatchCompleted V1 Contract
//!
//! Emitted when an intake batch finishes ingestion and becomes available
//! to downstream modules (data quality, risk, reporting).
//!
//! IMPORTANT: Field names are the wire contract (camelCase). Do not add
//! validations here; consumers own their own checks.

use serde::{Deserialize, Serialize};

/// Event type tag on the wire and in outbox rows
pub const BATCH_COMPLETED_TYPE: &str = "batch.completed";

/// Current payload schema version
pub const BATCH_COMPLETED_SCHEMA_VERSION: i32 = 1;

/// Payload for the batch.completed integration event
///
/// Used with `IntegrationEnvelope<BatchCompletedV1>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompletedV1 {
    /// Business key of the completed batch
    pub batch_id: String,

    /// System the records were ingested from
    pub source_system: String,

    /// Number of records accepted into the batch
    pub record_count: i64,

    /// Completion instant (RFC 3339)
    pub completed_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let payload = BatchCompletedV1 {
            batch_id: "B-2031".to_string(),
            source_system: "core-banking".to_string(),
            record_count: 1200,
            completed_at: "2026-03-01T12:00:00Z".to_string(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["batchId"], "B-2031");
        assert_eq!(value["sourceSystem"], "core-banking");
        assert_eq!(value["recordCount"], 1200);
        assert_eq!(value["completedAt"], "2026-03-01T12:00:00Z");
    }

    #[test]
    fn test_deserialize_tolerates_additive_fields() {
        let raw = serde_json::json!({
            "batchId": "B-1",
            "sourceSystem": "crm",
            "recordCount": 3,
            "completedAt": "2026-03-01T12:00:00Z",
            "addedInV2": "ignored by v1 consumers"
        });

        let payload: BatchCompletedV1 = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.batch_id, "B-1");
    }
}
