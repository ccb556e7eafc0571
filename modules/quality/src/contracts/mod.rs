//! Integration event contracts
//!
//! `batch_completed_v1` is this module's copy of the ingestion contract
//! (consumers own their view of foreign schemas; the adapter is the only
//! place it is read). The quality_* contracts are owned and produced
//! here.

pub mod batch_completed_v1;
pub mod quality_results_recorded_v1;
pub mod quality_scores_calculated_v1;
pub mod quality_validation_started_v1;

pub use batch_completed_v1::{BatchCompletedV1, BATCH_COMPLETED_TYPE};
pub use quality_results_recorded_v1::{
    QualityResultsRecordedV1, QUALITY_RESULTS_RECORDED_SCHEMA_VERSION,
    QUALITY_RESULTS_RECORDED_TYPE,
};
pub use quality_scores_calculated_v1::{
    QualityScoresCalculatedV1, QUALITY_SCORES_CALCULATED_SCHEMA_VERSION,
    QUALITY_SCORES_CALCULATED_TYPE,
};
pub use quality_validation_started_v1::{
    QualityValidationStartedV1, QUALITY_VALIDATION_STARTED_SCHEMA_VERSION,
    QUALITY_VALIDATION_STARTED_TYPE,
};
