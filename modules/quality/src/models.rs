use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A batch this module has accepted for quality processing
///
/// `batch_id` is the natural key shared with the ingestion module; the
/// unique constraint on it is the repository-level idempotency guard.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReceivedBatch {
    pub id: Uuid,
    pub batch_id: String,
    pub source_system: String,
    pub record_count: i64,
    pub registered_at: DateTime<Utc>,
}

/// Validation results recorded for one batch
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QualityResults {
    pub id: Uuid,
    pub batch_id: String,
    pub total_records: i64,
    pub valid_records: i64,
    pub invalid_records: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Quality scores calculated for one batch
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QualityScores {
    pub id: Uuid,
    pub batch_id: String,
    pub completeness_score: f64,
    pub validity_score: f64,
    pub overall_score: f64,
    pub calculated_at: DateTime<Utc>,
}
