use axum::{routing::get, Router};
use event_bus::consumer_retry::RetryConfig;
use event_bus::{EventBus, InMemoryBus, NatsBus};
use event_fabric::{
    DeliveryMode, DomainBus, FabricConfig, FabricMetrics, InboundDispatcher, InboxProcessor,
    ListenerRegistry, OutboxProcessor, PgOutboxStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use quality_rs::adapters::batch_completed_adapter;
use quality_rs::config::Config;
use quality_rs::contracts::BATCH_COMPLETED_TYPE;
use quality_rs::domain;
use quality_rs::handlers::{AnnounceValidationStart, RegisterReceivedBatch};
use quality_rs::health::health;
use quality_rs::repos::PgReceivedBatchStore;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting quality service...");

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration from environment");
    let fabric_config = FabricConfig::from_env().expect("Failed to load fabric configuration");

    tracing::info!(
        "Configuration loaded: host={}, port={}, bus_type={}",
        config.host,
        config.port,
        config.bus_type
    );

    // Database connection
    tracing::info!("Connecting to database...");
    let pool = quality_rs::db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Create event bus
    let bus: Arc<dyn EventBus> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("Using InMemory event bus");
            Arc::new(InMemoryBus::new())
        }
        "nats" => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let client = async_nats::connect(&config.nats_url)
                .await
                .expect("Failed to connect to NATS");
            Arc::new(NatsBus::new(client))
        }
        _ => panic!(
            "Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'",
            config.bus_type
        ),
    };

    // Fabric metrics
    let registry = prometheus::Registry::new();
    let metrics = FabricMetrics::register(&registry).expect("Failed to register fabric metrics");

    // Stores
    let outbox_store = Arc::new(PgOutboxStore::new(pool.clone()));
    let inbox_store = Arc::new(event_fabric::inbox::PgInboxStore::new(pool.clone()));
    let batch_store = Arc::new(PgReceivedBatchStore::new(pool.clone()));

    // Domain bus: explicit subscriptions at startup
    let mut domain_bus = DomainBus::new();
    domain_bus.subscribe(
        domain::BATCH_RECEIVED,
        DeliveryMode::Transactional,
        Arc::new(RegisterReceivedBatch::new(batch_store)),
    );
    domain_bus.subscribe(
        domain::VALIDATION_REQUESTED,
        DeliveryMode::AfterCommit,
        Arc::new(AnnounceValidationStart::new(outbox_store.clone())),
    );
    let domain_bus = Arc::new(domain_bus);
    domain_bus.clone().spawn_after_commit_worker(RetryConfig::default());

    // Inbound listeners: the adapter is the only reader of foreign schemas
    let mut listener_registry = ListenerRegistry::new();
    listener_registry.register(
        BATCH_COMPLETED_TYPE,
        Arc::new(batch_completed_adapter(domain_bus.clone())),
    );
    let listener_registry = Arc::new(listener_registry);

    // Shutdown signal shared by the processor tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Inbound dispatcher: ingestion events into the local inbox
    let dispatcher = InboundDispatcher::new(
        bus.clone(),
        inbox_store.clone(),
        listener_registry.clone(),
        "ingestion.events.>",
    )
    .with_quarantine_attempts(fabric_config.inbox.quarantine_attempts)
    .with_metrics(metrics.clone());
    tokio::spawn(dispatcher.run(shutdown_rx.clone()));

    // Inbox replay processor
    let inbox_processor = InboxProcessor::new(
        inbox_store,
        listener_registry,
        fabric_config.inbox.clone(),
    )
    .with_metrics(metrics.clone());
    tokio::spawn(inbox_processor.run(shutdown_rx.clone()));

    // Outbox processor draining this module's own events
    let outbox_processor = OutboxProcessor::new(
        outbox_store,
        bus,
        "quality.events",
        fabric_config.outbox.clone(),
        fabric_config.bus.clone(),
        shutdown_rx,
    )
    .with_metrics(metrics);
    tokio::spawn(outbox_processor.run());

    // Build the application router
    let app = Router::new().route("/api/health", get(health)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    // Bind to the configured address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Quality service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    // Start the server; flip the shutdown flag on ctrl-c
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .expect("Server failed to start");
}
