//! QualityResultsRecorded V1 Contract
//!
//! Emitted after the validation engine's results for a batch are
//! persisted. Consumed by risk calculation and reporting.

use serde::{Deserialize, Serialize};

pub const QUALITY_RESULTS_RECORDED_TYPE: &str = "quality.results.recorded";
pub const QUALITY_RESULTS_RECORDED_SCHEMA_VERSION: i32 = 1;

/// Payload for the quality.results.recorded integration event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityResultsRecordedV1 {
    pub batch_id: String,
    pub total_records: i64,
    pub valid_records: i64,
    pub invalid_records: i64,
    pub recorded_at: String,
}
