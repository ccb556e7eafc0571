//! # Event Fabric
//!
//! Cross-module event delivery for the platform: the transactional outbox,
//! the per-subscriber inbox, the correlation context, and the in-process
//! domain bus.
//!
//! ## Why This Lives in Tier 1
//!
//! Every module that emits or consumes integration events carries the same
//! reliability machinery: write the event in the business transaction,
//! drain it to the bus, dedupe on the consumer, replay after a crash.
//! Keeping one implementation in `platform/` means the duplicate-processing
//! bugs get fixed once instead of per module.
//!
//! ## Delivery contract
//!
//! At-least-once between modules, idempotent consumers. Three layers close
//! every duplicate race:
//!
//! 1. Integration adapters skip themselves on inbox replay
//!    ([`adapter::IntegrationAdapter`])
//! 2. Command handlers check their natural key before acting
//!    ([`idempotency::handle_idempotent`])
//! 3. Repositories treat unique-key violations as success
//!    ([`idempotency::is_unique_violation`])
//!
//! ## Happy path
//!
//! ```text
//! producer tx ── domain event ── integration envelope ── outbox row (same tx)
//!      └── commit
//! outbox processor ── claim PENDING ── publish ── mark PROCESSED
//! inbound dispatcher ── inbox insert-if-absent ── listeners ── mark PROCESSED
//! adapter ── local domain event ── domain bus ── idempotent handler
//! ```
//!
//! Stores come in two flavors per the platform convention: Postgres for
//! production and an in-memory twin for dev/test, selected by the module's
//! wiring the same way `BUS_TYPE` selects the bus.

pub mod adapter;
pub mod config;
pub mod context;
pub mod domain_bus;
pub mod error;
pub mod event;
pub mod health;
pub mod idempotency;
pub mod inbox;
pub mod metrics;
pub mod outbox;

pub use adapter::IntegrationAdapter;
pub use config::{BusConfig, FabricConfig, InboxConfig, OutboxConfig};
pub use context::CorrelationContext;
pub use domain_bus::{DeliveryMode, DomainBus, DomainEventHandler, EmitSink};
pub use error::{ErrorKind, FabricError, FabricResult};
pub use event::DomainEvent;
pub use health::{FabricHealth, HealthThresholds};
pub use inbox::dispatcher::{InboundDispatcher, IntegrationEventListener, ListenerRegistry};
pub use inbox::processor::InboxProcessor;
pub use inbox::{
    InboxMessage, InboxStats, InboxStatus, InboxStore, InsertOutcome, MemoryInboxStore,
    NewInboxMessage, PgInboxStore,
};
pub use metrics::FabricMetrics;
pub use outbox::processor::OutboxProcessor;
pub use outbox::{
    stage_integration_event, MemoryOutboxStore, NewOutboxMessage, OutboxAppend, OutboxMessage,
    OutboxStats, OutboxStatus, OutboxStore, PgOutboxStore,
};
