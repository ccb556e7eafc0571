//! Received-batch store: the repository idempotency layer
//!
//! The natural key is `batch_id`; its unique constraint makes a duplicate
//! insert a success, not an error. Even if the adapter and the command
//! handler both miss a duplicate (they should not), the write itself
//! cannot double-apply.

use crate::models::ReceivedBatch;
use async_trait::async_trait;
use event_fabric::idempotency::is_unique_violation;
use event_fabric::FabricResult;
use sqlx::PgPool;
use uuid::Uuid;

/// Input for registering a batch
#[derive(Debug, Clone)]
pub struct NewReceivedBatch {
    pub batch_id: String,
    pub source_system: String,
    pub record_count: i64,
}

/// Store of batches accepted into the quality pipeline
#[async_trait]
pub trait ReceivedBatchStore: Send + Sync {
    /// Whether the natural key is already registered
    async fn exists(&self, batch_id: &str) -> FabricResult<bool>;

    /// Insert the batch; a duplicate natural key is SUCCESS
    async fn insert(&self, batch: &NewReceivedBatch) -> FabricResult<()>;
}

/// Postgres implementation of [`ReceivedBatchStore`]
pub struct PgReceivedBatchStore {
    pool: PgPool,
}

impl PgReceivedBatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a registered batch by natural key
    pub async fn find(&self, batch_id: &str) -> FabricResult<Option<ReceivedBatch>> {
        let row = sqlx::query_as::<_, ReceivedBatch>(
            r#"
            SELECT id, batch_id, source_system, record_count, registered_at
            FROM received_batches
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[async_trait]
impl ReceivedBatchStore for PgReceivedBatchStore {
    async fn exists(&self, batch_id: &str) -> FabricResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM received_batches WHERE batch_id = $1)",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn insert(&self, batch: &NewReceivedBatch) -> FabricResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO received_batches
                (id, batch_id, source_system, record_count, registered_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&batch.batch_id)
        .bind(&batch.source_system)
        .bind(batch.record_count)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(
                    batch_id = %batch.batch_id,
                    "Duplicate batch registration treated as success"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
