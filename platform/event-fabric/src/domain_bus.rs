//! In-process domain event bus
//!
//! Single-module, single-process dispatch of [`DomainEvent`]s. Handlers
//! are registered explicitly at startup as `(event_type, mode, handler)`;
//! there is no reflection and no annotation scanning.
//!
//! Two delivery modes:
//!
//! - **Transactional**: the handler runs inline in the caller's task,
//!   inside whatever transaction the caller holds. The first failure
//!   aborts the producer.
//! - **AfterCommit**: deliveries are collected during dispatch and only
//!   handed to the worker once the caller flushes them after its commit.
//!   Failures are logged and retried on a local queue, never surfaced to
//!   the producer; durable after-commit effects belong in the outbox
//!   instead.
//!
//! Handlers may emit follow-up events through the [`EmitSink`]; dispatch
//! drains them breadth-first, so a re-entrant listener cannot recurse
//! unboundedly and delivery follows emission order.

use crate::context::CorrelationContext;
use crate::error::FabricResult;
use crate::event::DomainEvent;
use async_trait::async_trait;
use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// When a subscription's handler runs relative to the producer's transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Inline in the producer's transaction; failure aborts the producer
    Transactional,
    /// On the worker after the producer commits; failure is logged and retried
    AfterCommit,
}

/// A subscriber to in-process domain events
#[async_trait]
pub trait DomainEventHandler: Send + Sync {
    /// Stable name used in logs and retry context
    fn name(&self) -> &str;

    /// Handle one domain event; follow-up events go through `sink`
    async fn handle(
        &self,
        event: &DomainEvent,
        ctx: &CorrelationContext,
        sink: &EmitSink,
    ) -> FabricResult<()>;
}

/// Collector for events emitted by handlers mid-dispatch
pub struct EmitSink {
    queue: Mutex<VecDeque<DomainEvent>>,
}

impl EmitSink {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a follow-up event for breadth-first dispatch
    pub fn emit(&self, event: DomainEvent) {
        self.queue.lock().expect("emit sink poisoned").push_back(event);
    }

    fn drain(&self) -> Vec<DomainEvent> {
        self.queue
            .lock()
            .expect("emit sink poisoned")
            .drain(..)
            .collect()
    }
}

/// After-commit deliveries collected by a dispatch, awaiting the
/// producer's commit
///
/// Flush after a successful commit; dropping the batch (rollback path)
/// discards the deliveries, which is exactly what "after commit" means.
#[must_use = "flush after commit or the after-commit listeners never run"]
pub struct AfterCommitBatch(Vec<(DomainEvent, CorrelationContext)>);

impl AfterCommitBatch {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// The in-process bus for one module
pub struct DomainBus {
    transactional: HashMap<String, Vec<Arc<dyn DomainEventHandler>>>,
    after_commit: HashMap<String, Vec<Arc<dyn DomainEventHandler>>>,
    sender: mpsc::UnboundedSender<(DomainEvent, CorrelationContext)>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<(DomainEvent, CorrelationContext)>>>,
}

impl DomainBus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            transactional: HashMap::new(),
            after_commit: HashMap::new(),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Register a handler; registration order is delivery order within a
    /// mode
    pub fn subscribe(
        &mut self,
        event_type: &str,
        mode: DeliveryMode,
        handler: Arc<dyn DomainEventHandler>,
    ) {
        let map = match mode {
            DeliveryMode::Transactional => &mut self.transactional,
            DeliveryMode::AfterCommit => &mut self.after_commit,
        };
        map.entry(event_type.to_string()).or_default().push(handler);
    }

    /// Dispatch an event and everything it triggers, breadth-first
    ///
    /// Transactional handlers run inline; the first error aborts the whole
    /// dispatch and should abort the caller's transaction with it. The
    /// returned batch holds the after-commit deliveries for the caller to
    /// flush once its transaction commits.
    pub async fn dispatch(
        &self,
        event: DomainEvent,
        ctx: &CorrelationContext,
    ) -> FabricResult<AfterCommitBatch> {
        let sink = EmitSink::new();
        let mut queue = VecDeque::new();
        queue.push_back(event);

        let mut after_commit = Vec::new();

        while let Some(event) = queue.pop_front() {
            if self.after_commit.contains_key(&event.event_type) {
                after_commit.push((event.clone(), ctx.clone()));
            }

            if let Some(handlers) = self.transactional.get(&event.event_type) {
                for handler in handlers {
                    handler.handle(&event, ctx, &sink).await.inspect_err(|e| {
                        tracing::warn!(
                            event_id = %event.event_id,
                            event_type = %event.event_type,
                            handler = handler.name(),
                            correlation_id = %ctx.correlation_id(),
                            error = %e,
                            "Transactional handler failed, aborting producer"
                        );
                    })?;
                }
            }

            queue.extend(sink.drain());
        }

        Ok(AfterCommitBatch(after_commit))
    }

    /// Hand a batch to the after-commit worker
    ///
    /// Call this only after the producing transaction committed.
    pub fn flush_after_commit(&self, batch: AfterCommitBatch) {
        for item in batch.0 {
            // Send only fails when the bus itself is gone
            let _ = self.sender.send(item);
        }
    }

    /// Spawn the worker that drains after-commit deliveries
    ///
    /// One worker per bus; a second call is a logged no-op.
    pub fn spawn_after_commit_worker(
        self: Arc<Self>,
        retry: RetryConfig,
    ) -> tokio::task::JoinHandle<()> {
        let receiver = self
            .receiver
            .lock()
            .expect("domain bus receiver poisoned")
            .take();
        let bus = self;

        tokio::spawn(async move {
            let Some(mut receiver) = receiver else {
                tracing::warn!("After-commit worker already running");
                return;
            };

            tracing::info!("After-commit worker started");

            while let Some((event, ctx)) = receiver.recv().await {
                bus.deliver_after_commit(&event, &ctx, &retry).await;
            }

            tracing::info!("After-commit worker stopped");
        })
    }

    async fn deliver_after_commit(
        &self,
        event: &DomainEvent,
        ctx: &CorrelationContext,
        retry: &RetryConfig,
    ) {
        let sink = EmitSink::new();

        if let Some(handlers) = self.after_commit.get(&event.event_type) {
            for handler in handlers {
                let result =
                    retry_with_backoff(|| handler.handle(event, ctx, &sink), retry, handler.name())
                        .await;

                if let Err(e) = result {
                    tracing::error!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        handler = handler.name(),
                        correlation_id = %ctx.correlation_id(),
                        error = %e,
                        "After-commit listener failed after retries"
                    );
                }
            }
        }

        // Events emitted by after-commit handlers go through a fresh
        // dispatch; there is no producer transaction left to join
        for emitted in sink.drain() {
            match self.dispatch(emitted, ctx).await {
                Ok(batch) => self.flush_after_commit(batch),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        "Dispatch of after-commit follow-up event failed"
                    );
                }
            }
        }
    }
}

impl Default for DomainBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FabricError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorder {
        order: Arc<Mutex<Vec<String>>>,
        label: String,
        emits: Vec<String>,
    }

    #[async_trait]
    impl DomainEventHandler for Recorder {
        fn name(&self) -> &str {
            &self.label
        }

        async fn handle(
            &self,
            event: &DomainEvent,
            ctx: &CorrelationContext,
            sink: &EmitSink,
        ) -> FabricResult<()> {
            self.order
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, event.event_type));
            for emit_type in &self.emits {
                sink.emit(DomainEvent::new(emit_type.clone(), ctx, json!({})));
            }
            Ok(())
        }
    }

    fn recorder(order: &Arc<Mutex<Vec<String>>>, label: &str, emits: &[&str]) -> Arc<Recorder> {
        Arc::new(Recorder {
            order: order.clone(),
            label: label.to_string(),
            emits: emits.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[tokio::test]
    async fn test_breadth_first_dispatch_follows_emission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bus = DomainBus::new();
        bus.subscribe(
            "a",
            DeliveryMode::Transactional,
            recorder(&order, "h", &["b", "c"]),
        );
        bus.subscribe("b", DeliveryMode::Transactional, recorder(&order, "h", &["d"]));
        bus.subscribe("c", DeliveryMode::Transactional, recorder(&order, "h", &[]));
        bus.subscribe("d", DeliveryMode::Transactional, recorder(&order, "h", &[]));

        let ctx = CorrelationContext::new();
        let batch = bus
            .dispatch(DomainEvent::new("a", &ctx, json!({})), &ctx)
            .await
            .unwrap();
        assert!(batch.is_empty());

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["h:a", "h:b", "h:c", "h:d"]);
    }

    #[tokio::test]
    async fn test_transactional_failure_aborts_dispatch() {
        struct Failing;

        #[async_trait]
        impl DomainEventHandler for Failing {
            fn name(&self) -> &str {
                "failing"
            }

            async fn handle(
                &self,
                _event: &DomainEvent,
                _ctx: &CorrelationContext,
                _sink: &EmitSink,
            ) -> FabricResult<()> {
                Err(FabricError::BusinessFatal("invariant violated".into()))
            }
        }

        let mut bus = DomainBus::new();
        bus.subscribe("a", DeliveryMode::Transactional, Arc::new(Failing));

        let ctx = CorrelationContext::new();
        let result = bus.dispatch(DomainEvent::new("a", &ctx, json!({})), &ctx).await;

        assert!(result.is_err());
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail_first: usize,
    }

    #[async_trait]
    impl DomainEventHandler for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(
            &self,
            _event: &DomainEvent,
            _ctx: &CorrelationContext,
            _sink: &EmitSink,
        ) -> FabricResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(FabricError::Transient("not yet".into()))
            } else {
                Ok(())
            }
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_after_commit_runs_only_after_flush() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = DomainBus::new();
        bus.subscribe(
            "a",
            DeliveryMode::AfterCommit,
            Arc::new(Counting {
                calls: calls.clone(),
                fail_first: 0,
            }),
        );
        let bus = Arc::new(bus);
        bus.clone().spawn_after_commit_worker(fast_retry());

        let ctx = CorrelationContext::new();
        let batch = bus
            .dispatch(DomainEvent::new("a", &ctx, json!({})), &ctx)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);

        // Not flushed yet: no delivery
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.flush_after_commit(batch);

        // Worker picks it up
        for _ in 0..50 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_batch_delivers_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = DomainBus::new();
        bus.subscribe(
            "a",
            DeliveryMode::AfterCommit,
            Arc::new(Counting {
                calls: calls.clone(),
                fail_first: 0,
            }),
        );
        let bus = Arc::new(bus);
        bus.clone().spawn_after_commit_worker(fast_retry());

        let ctx = CorrelationContext::new();
        let batch = bus
            .dispatch(DomainEvent::new("a", &ctx, json!({})), &ctx)
            .await
            .unwrap();
        drop(batch); // producer rolled back

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_after_commit_retries_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = DomainBus::new();
        bus.subscribe(
            "a",
            DeliveryMode::AfterCommit,
            Arc::new(Counting {
                calls: calls.clone(),
                fail_first: 2,
            }),
        );
        let bus = Arc::new(bus);
        bus.clone().spawn_after_commit_worker(fast_retry());

        let ctx = CorrelationContext::new();
        let batch = bus
            .dispatch(DomainEvent::new("a", &ctx, json!({})), &ctx)
            .await
            .unwrap();
        bus.flush_after_commit(batch);

        for _ in 0..50 {
            if calls.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        // Two failures then one success
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
