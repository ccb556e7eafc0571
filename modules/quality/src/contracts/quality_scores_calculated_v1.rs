//! QualityScoresCalculated V1 Contract
//!
//! Emitted after quality scores for a batch are persisted.

use serde::{Deserialize, Serialize};

pub const QUALITY_SCORES_CALCULATED_TYPE: &str = "quality.scores.calculated";
pub const QUALITY_SCORES_CALCULATED_SCHEMA_VERSION: i32 = 1;

/// Payload for the quality.scores.calculated integration event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityScoresCalculatedV1 {
    pub batch_id: String,
    pub completeness_score: f64,
    pub validity_score: f64,
    pub overall_score: f64,
    pub calculated_at: String,
}
