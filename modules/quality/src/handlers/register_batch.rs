//! Command handler registering an inbound batch, idempotently
//!
//! Runs transactionally on `quality.batch.received`. The handler-level
//! guard is the natural-key existence check; the repository beneath it
//! treats a duplicate insert as success. Only a first registration emits
//! the validation-requested follow-up, so duplicates cannot trigger a
//! second validation run.

use crate::contracts::BatchCompletedV1;
use crate::domain;
use crate::repos::{NewReceivedBatch, ReceivedBatchStore};
use async_trait::async_trait;
use event_fabric::idempotency::{handle_idempotent, Applied};
use event_fabric::{
    CorrelationContext, DomainEvent, DomainEventHandler, EmitSink, FabricError, FabricResult,
};
use std::sync::Arc;

pub struct RegisterReceivedBatch {
    store: Arc<dyn ReceivedBatchStore>,
}

impl RegisterReceivedBatch {
    pub fn new(store: Arc<dyn ReceivedBatchStore>) -> Self {
        Self { store }
    }

    fn parse(event: &DomainEvent) -> FabricResult<NewReceivedBatch> {
        let completed: BatchCompletedV1 = serde_json::from_value(event.payload.clone())
            .map_err(|e| FabricError::Schema(format!("bad batch payload: {}", e)))?;

        Ok(NewReceivedBatch {
            batch_id: completed.batch_id,
            source_system: completed.source_system,
            record_count: completed.record_count,
        })
    }
}

#[async_trait]
impl DomainEventHandler for RegisterReceivedBatch {
    fn name(&self) -> &str {
        "register_received_batch"
    }

    async fn handle(
        &self,
        event: &DomainEvent,
        ctx: &CorrelationContext,
        sink: &EmitSink,
    ) -> FabricResult<()> {
        let batch = Self::parse(event)?;

        let store = self.store.clone();
        let check_id = batch.batch_id.clone();
        let insert_store = self.store.clone();
        let insert_batch = batch.clone();

        let outcome = handle_idempotent(
            || async move { store.exists(&check_id).await },
            || async move { insert_store.insert(&insert_batch).await },
        )
        .await?;

        match outcome {
            Applied::Performed => {
                tracing::info!(
                    batch_id = %batch.batch_id,
                    record_count = batch.record_count,
                    correlation_id = %ctx.correlation_id(),
                    "Batch registered for quality processing"
                );
                sink.emit(domain::validation_requested(ctx, event.payload.clone()));
            }
            Applied::AlreadyApplied => {
                tracing::info!(
                    batch_id = %batch.batch_id,
                    "Batch already registered, no validation re-requested"
                );
            }
        }

        Ok(())
    }
}
