//! In-memory received-batch store for testing and development

use super::received_batch_repo::{NewReceivedBatch, ReceivedBatchStore};
use async_trait::async_trait;
use event_fabric::FabricResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Dev/test twin of [`super::PgReceivedBatchStore`]
#[derive(Clone, Default)]
pub struct MemoryReceivedBatchStore {
    rows: Arc<Mutex<HashMap<String, NewReceivedBatch>>>,
}

impl MemoryReceivedBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered batches (test introspection)
    pub fn len(&self) -> usize {
        self.rows.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReceivedBatchStore for MemoryReceivedBatchStore {
    async fn exists(&self, batch_id: &str) -> FabricResult<bool> {
        Ok(self
            .rows
            .lock()
            .expect("store lock poisoned")
            .contains_key(batch_id))
    }

    async fn insert(&self, batch: &NewReceivedBatch) -> FabricResult<()> {
        // Same contract as Postgres: duplicate natural key is success
        self.rows
            .lock()
            .expect("store lock poisoned")
            .entry(batch.batch_id.clone())
            .or_insert_with(|| batch.clone());
        Ok(())
    }
}
