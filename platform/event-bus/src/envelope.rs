//! # Integration Event Envelope
//!
//! Platform-wide wire envelope for all inter-module communication.
//!
//! ## Design Principles
//!
//! 1. **Single Source of Truth**: One envelope struct for the entire platform
//! 2. **Validation**: Centralized envelope validation logic
//! 3. **Versioning**: Additive-only payload evolution behind `schemaVersion`
//! 4. **Tracing**: Correlation id travels with every event
//!
//! ## Envelope Fields (wire names are camelCase)
//!
//! - `eventId`: Unique identifier, the consumer-side dedupe key
//! - `type`: Stable event type name (e.g., "batch.completed")
//! - `sourceModule`: Module that produced the event
//! - `schemaVersion`: Payload schema version; bumps are additive-only
//! - `occurredAt`: RFC 3339 timestamp when the event was generated
//! - `correlationId`: Links the full chain of work across modules
//! - `payload`: Event-specific data (generic type parameter)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard wire envelope for integration events
///
/// This envelope wraps every event published across module boundaries.
/// The serialized form is the stable wire contract; changing a field name
/// here is a breaking change for every module on the platform.
///
/// # Type Parameter
///
/// * `T` - The event-specific payload type
///
/// # Examples
///
/// ```rust
/// use event_bus::IntegrationEnvelope;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct BatchCompleted {
///     batch_id: String,
///     record_count: i64,
/// }
///
/// let envelope = IntegrationEnvelope::new(
///     "batch.completed",
///     "ingestion",
///     1,
///     "corr-456",
///     BatchCompleted {
///         batch_id: "B-2031".to_string(),
///         record_count: 1200,
///     },
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationEnvelope<T> {
    /// Unique event identifier (consumer dedupe key)
    pub event_id: Uuid,

    /// Stable event type name
    #[serde(rename = "type")]
    pub event_type: String,

    /// Module that generated the event (e.g., "ingestion", "quality", "billing")
    pub source_module: String,

    /// Payload schema version; evolve payloads additively only
    pub schema_version: i32,

    /// UTC timestamp when the event was generated
    pub occurred_at: DateTime<Utc>,

    /// Links the full chain of work this event belongs to
    pub correlation_id: String,

    /// Event-specific payload
    pub payload: T,
}

impl<T> IntegrationEnvelope<T> {
    /// Create a new envelope with a generated event_id and occurred_at
    pub fn new(
        event_type: impl Into<String>,
        source_module: impl Into<String>,
        schema_version: i32,
        correlation_id: impl Into<String>,
        payload: T,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            source_module: source_module.into(),
            schema_version,
            occurred_at: Utc::now(),
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    /// Pin the event id (useful for tests and redelivery drills)
    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = event_id;
        self
    }

    /// Pin the occurrence timestamp (useful for ordering tests)
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// Validate the envelope fields of a raw JSON value
///
/// # Validation Rules
///
/// - `eventId`: Must be present and parse as a UUID
/// - `type`: Must be non-empty
/// - `sourceModule`: Must be non-empty
/// - `schemaVersion`: Must be a positive integer
/// - `occurredAt`: Must be present
/// - `correlationId`: Must be non-empty
///
/// # Errors
///
/// Returns a descriptive error string if validation fails
pub fn validate_envelope_fields(envelope: &serde_json::Value) -> Result<(), String> {
    let event_id = envelope
        .get("eventId")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid eventId")?;

    Uuid::parse_str(event_id).map_err(|_| format!("eventId is not a UUID: {}", event_id))?;

    let event_type = envelope
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid type")?;

    if event_type.is_empty() {
        return Err("type cannot be empty".to_string());
    }

    let source_module = envelope
        .get("sourceModule")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid sourceModule")?;

    if source_module.is_empty() {
        return Err("sourceModule cannot be empty".to_string());
    }

    let schema_version = envelope
        .get("schemaVersion")
        .and_then(|v| v.as_i64())
        .ok_or("Missing or invalid schemaVersion")?;

    if schema_version < 1 {
        return Err(format!("schemaVersion must be >= 1, got {}", schema_version));
    }

    envelope
        .get("occurredAt")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid occurredAt")?;

    let correlation_id = envelope
        .get("correlationId")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid correlationId")?;

    if correlation_id.is_empty() {
        return Err("correlationId cannot be empty".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_creation() {
        let envelope = IntegrationEnvelope::new(
            "batch.completed",
            "ingestion",
            1,
            "corr-123",
            json!({"batch_id": "B-1"}),
        );

        assert_eq!(envelope.event_type, "batch.completed");
        assert_eq!(envelope.source_module, "ingestion");
        assert_eq!(envelope.schema_version, 1);
        assert_eq!(envelope.correlation_id, "corr-123");
    }

    #[test]
    fn test_wire_field_names_are_stable() {
        let envelope = IntegrationEnvelope::new(
            "batch.completed",
            "ingestion",
            1,
            "corr-123",
            json!({"batchId": "B-1"}),
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("eventId").is_some());
        assert_eq!(value.get("type").unwrap(), "batch.completed");
        assert_eq!(value.get("sourceModule").unwrap(), "ingestion");
        assert_eq!(value.get("schemaVersion").unwrap(), 1);
        assert!(value.get("occurredAt").is_some());
        assert_eq!(value.get("correlationId").unwrap(), "corr-123");
        // No snake_case leakage on the wire
        assert!(value.get("event_id").is_none());
        assert!(value.get("source_module").is_none());
    }

    #[test]
    fn test_envelope_round_trips() {
        let envelope = IntegrationEnvelope::new(
            "quality.results.recorded",
            "quality",
            2,
            "corr-789",
            json!({"batchId": "B-7", "score": 0.98}),
        );

        let bytes = serde_json::to_vec(&envelope).unwrap();
        let back: IntegrationEnvelope<serde_json::Value> =
            serde_json::from_slice(&bytes).unwrap();

        assert_eq!(back.event_id, envelope.event_id);
        assert_eq!(back.event_type, envelope.event_type);
        assert_eq!(back.schema_version, 2);
        assert_eq!(back.payload, envelope.payload);
    }

    #[test]
    fn test_validate_envelope_fields_valid() {
        let envelope = json!({
            "eventId": "550e8400-e29b-41d4-a716-446655440000",
            "type": "batch.completed",
            "sourceModule": "ingestion",
            "schemaVersion": 1,
            "occurredAt": "2026-01-01T00:00:00Z",
            "correlationId": "corr-123",
            "payload": {}
        });

        assert!(validate_envelope_fields(&envelope).is_ok());
    }

    #[test]
    fn test_validate_envelope_fields_missing_correlation_id() {
        let envelope = json!({
            "eventId": "550e8400-e29b-41d4-a716-446655440000",
            "type": "batch.completed",
            "sourceModule": "ingestion",
            "schemaVersion": 1,
            "occurredAt": "2026-01-01T00:00:00Z"
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }

    #[test]
    fn test_validate_envelope_fields_bad_event_id() {
        let envelope = json!({
            "eventId": "not-a-uuid",
            "type": "batch.completed",
            "sourceModule": "ingestion",
            "schemaVersion": 1,
            "occurredAt": "2026-01-01T00:00:00Z",
            "correlationId": "corr-123"
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }

    #[test]
    fn test_validate_envelope_fields_rejects_zero_schema_version() {
        let envelope = json!({
            "eventId": "550e8400-e29b-41d4-a716-446655440000",
            "type": "batch.completed",
            "sourceModule": "ingestion",
            "schemaVersion": 0,
            "occurredAt": "2026-01-01T00:00:00Z",
            "correlationId": "corr-123"
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }
}
