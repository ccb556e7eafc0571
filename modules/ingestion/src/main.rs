use axum::{routing::get, Router};
use event_bus::{EventBus, InMemoryBus, NatsBus};
use event_fabric::{FabricConfig, FabricMetrics, OutboxProcessor, PgOutboxStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use ingestion_rs::{config::Config, health::health};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting ingestion service...");

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
    let pool = ingestion_rs::db::init_pool(&config.database_url)
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

    // Shutdown signal shared by the processor tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the outbox processor draining BatchCompleted events to the bus
    let outbox_store = Arc::new(PgOutboxStore::new(pool.clone()));
    let processor = OutboxProcessor::new(
        outbox_store,
        bus.clone(),
        "ingestion.events",
        fabric_config.outbox.clone(),
        fabric_config.bus.clone(),
        shutdown_rx,
    )
    .with_metrics(metrics);
    tokio::spawn(processor.run());

    // Build the application router
    let app = Router::new().route("/api/health", get(health)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    // Bind to the configured address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Ingestion service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    // Start the server; flip the shutdown flag on ctrl-c so in-flight
    // publishes can finish before the leases lapse
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .expect("Server failed to start");
}
