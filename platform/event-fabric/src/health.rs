//! Fabric health signal
//!
//! Healthy iff no terminal-FAILED outbox rows older than the threshold and
//! the oldest PENDING work is younger than the SLA, on both logs. Modules
//! surface this through their `/api/health` endpoint.

use crate::error::FabricResult;
use crate::inbox::{InboxStats, InboxStore};
use crate::outbox::{OutboxStats, OutboxStore};
use serde::Serialize;
use std::time::Duration;

/// Age limits driving the health verdict
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// A FAILED outbox row older than this flips the module unhealthy
    pub max_failed_age: Duration,
    /// Oldest PENDING row (outbox or inbox) must be younger than this
    pub max_pending_age: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_failed_age: Duration::from_secs(300),
            max_pending_age: Duration::from_secs(600),
        }
    }
}

/// Snapshot of fabric health for one module
#[derive(Debug, Clone, Serialize)]
pub struct FabricHealth {
    pub healthy: bool,
    pub outbox_pending: i64,
    pub outbox_failed: i64,
    pub oldest_outbox_pending_age_secs: i64,
    pub inbox_pending: i64,
    pub inbox_failed: i64,
    pub oldest_inbox_pending_age_secs: i64,
}

impl FabricHealth {
    fn evaluate(
        outbox: OutboxStats,
        inbox: InboxStats,
        thresholds: &HealthThresholds,
    ) -> Self {
        let max_failed_age = thresholds.max_failed_age.as_secs() as i64;
        let max_pending_age = thresholds.max_pending_age.as_secs() as i64;

        let healthy = outbox.oldest_failed_age_secs < max_failed_age
            && outbox.oldest_pending_age_secs < max_pending_age
            && inbox.oldest_pending_age_secs < max_pending_age;

        Self {
            healthy,
            outbox_pending: outbox.pending,
            outbox_failed: outbox.failed,
            oldest_outbox_pending_age_secs: outbox.oldest_pending_age_secs,
            inbox_pending: inbox.pending,
            inbox_failed: inbox.failed,
            oldest_inbox_pending_age_secs: inbox.oldest_pending_age_secs,
        }
    }
}

/// Evaluate fabric health from the module's stores
pub async fn check(
    outbox: &dyn OutboxStore,
    inbox: &dyn InboxStore,
    thresholds: &HealthThresholds,
) -> FabricResult<FabricHealth> {
    let outbox_stats = outbox.stats().await?;
    let inbox_stats = inbox.stats().await?;

    Ok(FabricHealth::evaluate(outbox_stats, inbox_stats, thresholds))
}
