//! Validation results and score rows, written transactionally with their
//! outgoing integration events

use sqlx::{Postgres, Transaction};
use uuid::Uuid;

/// Insert a quality-results row within a transaction
pub async fn insert_results(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    batch_id: &str,
    total_records: i64,
    valid_records: i64,
    invalid_records: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO quality_results
            (id, batch_id, total_records, valid_records, invalid_records, recorded_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(id)
    .bind(batch_id)
    .bind(total_records)
    .bind(valid_records)
    .bind(invalid_records)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Insert a quality-scores row within a transaction
pub async fn insert_scores(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    batch_id: &str,
    completeness_score: f64,
    validity_score: f64,
    overall_score: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO quality_scores
            (id, batch_id, completeness_score, validity_score, overall_score, calculated_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(id)
    .bind(batch_id)
    .bind(completeness_score)
    .bind(validity_score)
    .bind(overall_score)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
