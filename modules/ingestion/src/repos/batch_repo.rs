use crate::models::ReportingBatch;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Insert a completed batch row within a transaction
///
/// Runs in the same transaction as the outbox append so the batch and its
/// BatchCompleted event commit or roll back together.
pub async fn insert_completed(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    batch_id: &str,
    source_system: &str,
    record_count: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO reporting_batches
            (id, batch_id, source_system, record_count, status, created_at, completed_at)
        VALUES ($1, $2, $3, $4, 'COMPLETED', NOW(), NOW())
        "#,
    )
    .bind(id)
    .bind(batch_id)
    .bind(source_system)
    .bind(record_count)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Check whether a batch with this business key exists
pub async fn exists(pool: &PgPool, batch_id: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM reporting_batches WHERE batch_id = $1)",
    )
    .bind(batch_id)
    .fetch_one(pool)
    .await
}

/// Fetch a batch by business key
pub async fn find_by_batch_id(
    pool: &PgPool,
    batch_id: &str,
) -> Result<Option<ReportingBatch>, sqlx::Error> {
    sqlx::query_as::<_, ReportingBatch>(
        r#"
        SELECT id, batch_id, source_system, record_count, status, created_at, completed_at
        FROM reporting_batches
        WHERE batch_id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_optional(pool)
    .await
}
