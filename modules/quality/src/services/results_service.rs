//! Recording of validation results and quality scores
//!
//! The producer side of this module: each service writes its business row
//! and the corresponding integration event into the outbox in one
//! transaction. The validation engine itself lives outside this module;
//! it hands finished results in here.

use crate::contracts::{
    QualityResultsRecordedV1, QualityScoresCalculatedV1, QUALITY_RESULTS_RECORDED_SCHEMA_VERSION,
    QUALITY_RESULTS_RECORDED_TYPE, QUALITY_SCORES_CALCULATED_SCHEMA_VERSION,
    QUALITY_SCORES_CALCULATED_TYPE,
};
use crate::repos::results_repo;
use chrono::Utc;
use event_bus::IntegrationEnvelope;
use event_fabric::outbox::append_in_tx;
use event_fabric::{stage_integration_event, CorrelationContext, FabricError};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ResultsServiceError {
    #[error("invalid results: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("event staging error: {0}")]
    Fabric(#[from] FabricError),
}

/// Validation results handed over by the rules engine
#[derive(Debug, Clone)]
pub struct ResultsInput {
    pub batch_id: String,
    pub total_records: i64,
    pub valid_records: i64,
}

/// Persist validation results and emit quality.results.recorded
pub async fn record_results(
    pool: &PgPool,
    input: ResultsInput,
    ctx: &CorrelationContext,
) -> Result<Uuid, ResultsServiceError> {
    if input.valid_records > input.total_records {
        return Err(ResultsServiceError::Validation(format!(
            "valid_records {} exceeds total_records {}",
            input.valid_records, input.total_records
        )));
    }
    let invalid_records = input.total_records - input.valid_records;

    let envelope = IntegrationEnvelope::new(
        QUALITY_RESULTS_RECORDED_TYPE,
        "quality",
        QUALITY_RESULTS_RECORDED_SCHEMA_VERSION,
        ctx.correlation_id(),
        QualityResultsRecordedV1 {
            batch_id: input.batch_id.clone(),
            total_records: input.total_records,
            valid_records: input.valid_records,
            invalid_records,
            recorded_at: Utc::now().to_rfc3339(),
        },
    );
    let staged = stage_integration_event(&envelope, Some(input.batch_id.clone()))?;
    let event_id = envelope.event_id;

    let mut tx = pool.begin().await?;
    results_repo::insert_results(
        &mut tx,
        event_id,
        &input.batch_id,
        input.total_records,
        input.valid_records,
        invalid_records,
    )
    .await?;
    append_in_tx(&mut tx, &[staged]).await?;
    tx.commit().await?;

    tracing::info!(
        batch_id = %input.batch_id,
        event_id = %event_id,
        valid_records = input.valid_records,
        invalid_records = invalid_records,
        "Quality results recorded"
    );

    Ok(event_id)
}

/// Persist quality scores and emit quality.scores.calculated
///
/// Scores are ratios derived from the recorded results; the weighting is
/// fixed platform policy, not per-tenant configuration.
pub async fn calculate_scores(
    pool: &PgPool,
    input: ResultsInput,
    ctx: &CorrelationContext,
) -> Result<Uuid, ResultsServiceError> {
    if input.total_records <= 0 {
        return Err(ResultsServiceError::Validation(
            "total_records must be positive".to_string(),
        ));
    }

    let validity_score = input.valid_records as f64 / input.total_records as f64;
    let completeness_score = 1.0;
    let overall_score = (validity_score + completeness_score) / 2.0;

    let envelope = IntegrationEnvelope::new(
        QUALITY_SCORES_CALCULATED_TYPE,
        "quality",
        QUALITY_SCORES_CALCULATED_SCHEMA_VERSION,
        ctx.correlation_id(),
        QualityScoresCalculatedV1 {
            batch_id: input.batch_id.clone(),
            completeness_score,
            validity_score,
            overall_score,
            calculated_at: Utc::now().to_rfc3339(),
        },
    );
    let staged = stage_integration_event(&envelope, Some(input.batch_id.clone()))?;
    let event_id = envelope.event_id;

    let mut tx = pool.begin().await?;
    results_repo::insert_scores(
        &mut tx,
        event_id,
        &input.batch_id,
        completeness_score,
        validity_score,
        overall_score,
    )
    .await?;
    append_in_tx(&mut tx, &[staged]).await?;
    tx.commit().await?;

    tracing::info!(
        batch_id = %input.batch_id,
        event_id = %event_id,
        overall_score = overall_score,
        "Quality scores calculated"
    );

    Ok(event_id)
}
