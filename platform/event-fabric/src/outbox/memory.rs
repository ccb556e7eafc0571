//! In-memory outbox store for testing and development
//!
//! The dev/test twin of [`super::PgOutboxStore`], honoring the same status
//! machine, lease reclaim, and per-aggregate-key ordering. The staged
//! [`MemoryOutboxTx`] mirrors the transactional append: rows become
//! visible on `commit` and vanish when the transaction is dropped.

use super::{
    NewOutboxMessage, OutboxAppend, OutboxMessage, OutboxStats, OutboxStatus, OutboxStore,
};
use crate::error::FabricResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    rows: Vec<OutboxMessage>,
}

/// In-memory implementation of [`OutboxStore`]
#[derive(Clone, Default)]
pub struct MemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a staged transaction
    ///
    /// Staged rows are invisible until `commit`; dropping the transaction
    /// without committing discards them, matching the rollback semantics
    /// of the Postgres append.
    pub fn begin(&self) -> MemoryOutboxTx {
        MemoryOutboxTx {
            store: self.clone(),
            staged: Vec::new(),
        }
    }

    /// Fetch a row by id (test introspection)
    pub fn get(&self, id: Uuid) -> Option<OutboxMessage> {
        let inner = self.inner.lock().expect("outbox lock poisoned");
        inner.rows.iter().find(|r| r.id == id).cloned()
    }

    /// Snapshot of every row (test introspection)
    pub fn all(&self) -> Vec<OutboxMessage> {
        let inner = self.inner.lock().expect("outbox lock poisoned");
        inner.rows.clone()
    }

    fn insert_pending(&self, rows: Vec<NewOutboxMessage>) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("outbox lock poisoned");
        for row in rows {
            inner.rows.push(OutboxMessage {
                id: row.id,
                aggregate_key: row.aggregate_key,
                event_type: row.event_type,
                payload: row.payload,
                occurred_at: row.occurred_at,
                status: OutboxStatus::Pending,
                attempt: 0,
                last_error: None,
                last_attempt_at: None,
                next_attempt_at: now,
                lease_expires_at: None,
                created_at: now,
            });
        }
    }

    /// A row is claimable when it is due and no earlier unfinished row
    /// shares its aggregate key.
    fn is_claimable(rows: &[OutboxMessage], idx: usize, now: DateTime<Utc>) -> bool {
        let row = &rows[idx];

        let due = match row.status {
            OutboxStatus::Pending => row.next_attempt_at <= now,
            OutboxStatus::Processing => row
                .lease_expires_at
                .map(|lease| lease <= now)
                .unwrap_or(false),
            OutboxStatus::Processed | OutboxStatus::Failed => false,
        };
        if !due {
            return false;
        }

        let Some(key) = row.aggregate_key.as_deref() else {
            return true;
        };

        !rows.iter().enumerate().any(|(other_idx, other)| {
            other_idx != idx
                && other.aggregate_key.as_deref() == Some(key)
                && other.occurred_at < row.occurred_at
                && other.status != OutboxStatus::Processed
        })
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn claim(&self, max_n: i64, lease: Duration) -> FabricResult<Vec<OutboxMessage>> {
        let now = Utc::now();
        let lease_expiry = now + chrono::Duration::from_std(lease).unwrap_or_default();

        let mut inner = self.inner.lock().expect("outbox lock poisoned");

        let mut claimable: Vec<usize> = (0..inner.rows.len())
            .filter(|&idx| Self::is_claimable(&inner.rows, idx, now))
            .collect();
        claimable.sort_by_key(|&idx| inner.rows[idx].occurred_at);
        claimable.truncate(max_n.max(0) as usize);

        let mut claimed = Vec::with_capacity(claimable.len());
        for idx in claimable {
            let row = &mut inner.rows[idx];
            if row.status == OutboxStatus::Processing {
                // Lease expired: this is a re-claim after a crash
                row.attempt += 1;
            }
            row.status = OutboxStatus::Processing;
            row.last_attempt_at = Some(now);
            row.lease_expires_at = Some(lease_expiry);
            claimed.push(row.clone());
        }

        Ok(claimed)
    }

    async fn mark_processed(&self, id: Uuid) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("outbox lock poisoned");
        if let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) {
            row.status = OutboxStatus::Processed;
            // attempt counts every publish attempt, the successful one included
            row.attempt += 1;
            row.lease_expires_at = None;
            row.last_error = None;
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("outbox lock poisoned");
        if let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) {
            row.status = OutboxStatus::Pending;
            row.attempt += 1;
            row.last_error = Some(error.to_string());
            row.next_attempt_at = next_attempt_at;
            row.lease_expires_at = None;
        }
        Ok(())
    }

    async fn mark_terminally_failed(&self, id: Uuid, error: &str) -> FabricResult<()> {
        let mut inner = self.inner.lock().expect("outbox lock poisoned");
        if let Some(row) = inner.rows.iter_mut().find(|r| r.id == id) {
            row.status = OutboxStatus::Failed;
            row.attempt += 1;
            row.last_error = Some(error.to_string());
            row.lease_expires_at = None;
        }
        Ok(())
    }

    async fn reset_failed(&self) -> FabricResult<u64> {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("outbox lock poisoned");
        let mut reset = 0;
        for row in inner.rows.iter_mut() {
            if row.status == OutboxStatus::Failed {
                row.status = OutboxStatus::Pending;
                row.attempt = 0;
                row.next_attempt_at = now;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn purge_processed(&self, older_than: DateTime<Utc>) -> FabricResult<u64> {
        let mut inner = self.inner.lock().expect("outbox lock poisoned");
        let before = inner.rows.len();
        inner
            .rows
            .retain(|r| !(r.status == OutboxStatus::Processed && r.created_at < older_than));
        Ok((before - inner.rows.len()) as u64)
    }

    async fn stats(&self) -> FabricResult<OutboxStats> {
        let now = Utc::now();
        let inner = self.inner.lock().expect("outbox lock poisoned");

        let mut stats = OutboxStats::default();
        for row in &inner.rows {
            match row.status {
                OutboxStatus::Pending => {
                    stats.pending += 1;
                    let age = (now - row.created_at).num_seconds().max(0);
                    stats.oldest_pending_age_secs = stats.oldest_pending_age_secs.max(age);
                }
                OutboxStatus::Processing => stats.processing += 1,
                OutboxStatus::Failed => {
                    stats.failed += 1;
                    let age = (now - row.created_at).num_seconds().max(0);
                    stats.oldest_failed_age_secs = stats.oldest_failed_age_secs.max(age);
                }
                OutboxStatus::Processed => {}
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl OutboxAppend for MemoryOutboxStore {
    async fn append(&self, rows: Vec<NewOutboxMessage>) -> FabricResult<()> {
        self.insert_pending(rows);
        Ok(())
    }
}

/// Staged in-memory transaction
///
/// Mirrors `sqlx::Transaction` semantics for the memory twin: nothing is
/// visible until `commit`, and dropping the value rolls back.
pub struct MemoryOutboxTx {
    store: MemoryOutboxStore,
    staged: Vec<NewOutboxMessage>,
}

impl MemoryOutboxTx {
    /// Stage rows for append; they stay invisible until commit
    pub fn stage(&mut self, rows: Vec<NewOutboxMessage>) {
        self.staged.extend(rows);
    }

    /// Make all staged rows visible as PENDING
    pub fn commit(self) {
        let MemoryOutboxTx { store, staged } = self;
        store.insert_pending(staged);
    }
}
