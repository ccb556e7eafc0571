//! In-memory inbox store for testing and development

use super::{InboxMessage, InboxStats, InboxStatus, InboxStore, InsertOutcome, NewInboxMessage};
use crate::error::FabricResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory implementation of [`InboxStore`]
///
/// The dev/test twin of [`super::PgInboxStore`]; same insert-if-absent
/// and replay semantics, backed by a map keyed on event id.
#[derive(Clone, Default)]
pub struct MemoryInboxStore {
    inner: Arc<Mutex<HashMap<Uuid, InboxMessage>>>,
}

impl MemoryInboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row (test introspection)
    pub fn all(&self) -> Vec<InboxMessage> {
        let inner = self.inner.lock().expect("inbox lock poisoned");
        inner.values().cloned().collect()
    }
}

#[async_trait]
impl InboxStore for MemoryInboxStore {
    async fn insert_if_absent(&self, msg: NewInboxMessage) -> FabricResult<InsertOutcome> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");

        if inner.contains_key(&msg.event_id) {
            return Ok(InsertOutcome::Duplicate);
        }

        inner.insert(
            msg.event_id,
            InboxMessage {
                event_id: msg.event_id,
                source_module: msg.source_module,
                event_type: msg.event_type,
                payload: msg.payload,
                received_at: Utc::now(),
                status: InboxStatus::Pending,
                replay_required: msg.replay_required,
                attempt: 0,
                last_error: None,
            },
        );

        Ok(InsertOutcome::Inserted)
    }

    async fn mark_processed(&self, event_id: Uuid) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        if let Some(row) = inner.get_mut(&event_id) {
            row.status = InboxStatus::Processed;
            row.last_error = None;
        }
        Ok(())
    }

    async fn mark_failed(&self, event_id: Uuid, error: &str) -> FabricResult<i32> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        if let Some(row) = inner.get_mut(&event_id) {
            row.attempt += 1;
            row.last_error = Some(error.to_string());
            Ok(row.attempt)
        } else {
            Ok(0)
        }
    }

    async fn mark_skipped(&self, event_id: Uuid) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        if let Some(row) = inner.get_mut(&event_id) {
            row.status = InboxStatus::Skipped;
        }
        Ok(())
    }

    async fn quarantine(&self, event_id: Uuid, error: &str) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        if let Some(row) = inner.get_mut(&event_id) {
            row.status = InboxStatus::Failed;
            row.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn request_replay(&self, event_id: Uuid) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        if let Some(row) = inner.get_mut(&event_id) {
            row.replay_required = true;
        }
        Ok(())
    }

    async fn mark_replay_done(&self, event_id: Uuid) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        if let Some(row) = inner.get_mut(&event_id) {
            row.replay_required = false;
            if row.status == InboxStatus::Pending {
                row.status = InboxStatus::Processed;
            }
        }
        Ok(())
    }

    async fn due_for_replay(&self, max_n: i64) -> FabricResult<Vec<InboxMessage>> {
        let inner = self.inner.lock().expect("inbox lock poisoned");
        let mut due: Vec<InboxMessage> = inner
            .values()
            .filter(|row| {
                row.replay_required
                    && matches!(row.status, InboxStatus::Pending | InboxStatus::Processed)
            })
            .cloned()
            .collect();
        due.sort_by_key(|row| row.received_at);
        due.truncate(max_n.max(0) as usize);
        Ok(due)
    }

    async fn get(&self, event_id: Uuid) -> FabricResult<Option<InboxMessage>> {
        let inner = self.inner.lock().expect("inbox lock poisoned");
        Ok(inner.get(&event_id).cloned())
    }

    async fn purge_processed(&self, older_than: DateTime<Utc>) -> FabricResult<u64> {
        let mut inner = self.inner.lock().expect("inbox lock poisoned");
        let before = inner.len();
        inner.retain(|_, row| {
            !(row.status == InboxStatus::Processed
                && !row.replay_required
                && row.received_at < older_than)
        });
        Ok((before - inner.len()) as u64)
    }

    async fn stats(&self) -> FabricResult<InboxStats> {
        let now = Utc::now();
        let inner = self.inner.lock().expect("inbox lock poisoned");

        let mut stats = InboxStats::default();
        for row in inner.values() {
            match row.status {
                InboxStatus::Pending => {
                    stats.pending += 1;
                    let age = (now - row.received_at).num_seconds().max(0);
                    stats.oldest_pending_age_secs = stats.oldest_pending_age_secs.max(age);
                }
                InboxStatus::Failed => stats.failed += 1,
                InboxStatus::Processed | InboxStatus::Skipped => {}
            }
        }
        Ok(stats)
    }
}
