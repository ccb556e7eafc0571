//! QualityValidationStarted V1 Contract
//!
//! Announced when this module accepts a batch and begins validation.

use serde::{Deserialize, Serialize};

pub const QUALITY_VALIDATION_STARTED_TYPE: &str = "quality.validation.started";
pub const QUALITY_VALIDATION_STARTED_SCHEMA_VERSION: i32 = 1;

/// Payload for the quality.validation.started integration event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityValidationStartedV1 {
    pub batch_id: String,
    pub record_count: i64,
    pub started_at: String,
}
