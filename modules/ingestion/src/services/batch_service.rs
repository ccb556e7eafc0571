//! Batch completion: the producer side of the outbox pattern
//!
//! `complete_batch` writes the batch row and the BatchCompleted outbox
//! row in ONE transaction. If either write fails, both roll back and the
//! caller sees the error; no half-committed state and no phantom event.

use crate::contracts::{BatchCompletedV1, BATCH_COMPLETED_SCHEMA_VERSION, BATCH_COMPLETED_TYPE};
use crate::models::CompleteBatchRequest;
use crate::repos::batch_repo;
use chrono::Utc;
use event_bus::IntegrationEnvelope;
use event_fabric::outbox::append_in_tx;
use event_fabric::{stage_integration_event, CorrelationContext, FabricError};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BatchServiceError {
    #[error("batch {0} already completed")]
    AlreadyCompleted(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("event staging error: {0}")]
    Fabric(#[from] FabricError),
}

/// Complete an intake batch and emit BatchCompleted through the outbox
///
/// Returns the id shared by the batch row and the integration event.
pub async fn complete_batch(
    pool: &PgPool,
    request: CompleteBatchRequest,
    ctx: &CorrelationContext,
) -> Result<Uuid, BatchServiceError> {
    // Natural-key guard: completing the same batch twice is a no-op error
    // surfaced to the caller, not a second event
    if batch_repo::exists(pool, &request.batch_id).await? {
        return Err(BatchServiceError::AlreadyCompleted(request.batch_id));
    }

    let completed_at = Utc::now();
    let envelope = IntegrationEnvelope::new(
        BATCH_COMPLETED_TYPE,
        "ingestion",
        BATCH_COMPLETED_SCHEMA_VERSION,
        ctx.correlation_id(),
        BatchCompletedV1 {
            batch_id: request.batch_id.clone(),
            source_system: request.source_system.clone(),
            record_count: request.record_count,
            completed_at: completed_at.to_rfc3339(),
        },
    );
    let staged = stage_integration_event(&envelope, Some(request.batch_id.clone()))?;
    let event_id = envelope.event_id;

    let mut tx = pool.begin().await?;

    batch_repo::insert_completed(
        &mut tx,
        event_id,
        &request.batch_id,
        &request.source_system,
        request.record_count,
    )
    .await?;

    append_in_tx(&mut tx, &[staged]).await?;

    tx.commit().await?;

    tracing::info!(
        batch_id = %request.batch_id,
        event_id = %event_id,
        correlation_id = %ctx.correlation_id(),
        record_count = request.record_count,
        "Batch completed, event staged in outbox"
    );

    Ok(event_id)
}
