//! Prometheus counters and gauges for the fabric

use prometheus::{IntCounter, IntGauge, Registry};

/// The operational surface of one module's fabric
///
/// Gauges reflect the latest store stats; counters are monotonic totals.
/// Create once per process and clone into the processor tasks.
#[derive(Clone)]
pub struct FabricMetrics {
    pub outbox_pending: IntGauge,
    pub outbox_processing: IntGauge,
    pub outbox_processed_total: IntCounter,
    pub outbox_failed_total: IntCounter,
    pub inbox_pending: IntGauge,
    pub inbox_duplicates_total: IntCounter,
    pub listener_failures_total: IntCounter,
}

impl FabricMetrics {
    /// Create the metric set, unregistered
    ///
    /// Useful in tests and in processes that scrape elsewhere.
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            outbox_pending: IntGauge::new("outbox_pending", "Outbox rows in PENDING")?,
            outbox_processing: IntGauge::new("outbox_processing", "Outbox rows in PROCESSING")?,
            outbox_processed_total: IntCounter::new(
                "outbox_processed_total",
                "Outbox rows published and marked PROCESSED",
            )?,
            outbox_failed_total: IntCounter::new(
                "outbox_failed_total",
                "Outbox rows marked terminally FAILED",
            )?,
            inbox_pending: IntGauge::new("inbox_pending", "Inbox rows in PENDING")?,
            inbox_duplicates_total: IntCounter::new(
                "inbox_duplicates_total",
                "Inbound events deduplicated by the inbox",
            )?,
            listener_failures_total: IntCounter::new(
                "listener_failures_total",
                "Listener invocations that failed after retries",
            )?,
        })
    }

    /// Create the metric set and register it with the given registry
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self::new()?;
        registry.register(Box::new(metrics.outbox_pending.clone()))?;
        registry.register(Box::new(metrics.outbox_processing.clone()))?;
        registry.register(Box::new(metrics.outbox_processed_total.clone()))?;
        registry.register(Box::new(metrics.outbox_failed_total.clone()))?;
        registry.register(Box::new(metrics.inbox_pending.clone()))?;
        registry.register(Box::new(metrics.inbox_duplicates_total.clone()))?;
        registry.register(Box::new(metrics.listener_failures_total.clone()))?;
        Ok(metrics)
    }
}
