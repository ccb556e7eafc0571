use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A regulatory reporting batch owned by the ingestion module
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReportingBatch {
    pub id: Uuid,
    /// Business key referenced by downstream modules
    pub batch_id: String,
    /// System the records were ingested from
    pub source_system: String,
    pub record_count: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for completing a batch
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteBatchRequest {
    pub batch_id: String,
    pub source_system: String,
    pub record_count: i64,
}
