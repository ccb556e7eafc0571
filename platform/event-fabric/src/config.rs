//! Fabric configuration parsed from environment variables

use std::env;
use std::time::Duration;

/// Outbox processor configuration
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Scheduler tick between claim batches
    pub poll_interval: Duration,
    /// Rows claimed per tick
    pub batch_size: i64,
    /// Retry cap before a row goes terminally FAILED
    pub max_attempts: i32,
    /// First retry delay; doubles per attempt
    pub base_backoff: Duration,
    /// Cap on the exponential backoff
    pub max_backoff: Duration,
    /// PROCESSING rows older than this are re-claimable
    pub lease: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 100,
            max_attempts: 10,
            base_backoff: Duration::from_millis(2000),
            max_backoff: Duration::from_secs(300),
            lease: Duration::from_secs(30),
        }
    }
}

/// Inbox replay and retention configuration
#[derive(Debug, Clone)]
pub struct InboxConfig {
    /// Tick between replay batches
    pub poll_interval: Duration,
    /// PROCESSED rows older than this are truncated. Must exceed the
    /// outbox retry horizon of every upstream module, or a late
    /// redelivery slips past the dedupe as unseen.
    pub retention: Duration,
    /// Master switch for the replay loop
    pub replay_enabled: bool,
    /// Failed redeliveries before a PENDING row is quarantined
    pub quarantine_attempts: i32,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            retention: Duration::from_secs(168 * 3600),
            replay_enabled: true,
            quarantine_attempts: 5,
        }
    }
}

/// Cross-module bus publish configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Per-publish deadline; timeout counts as a transient failure
    pub publish_timeout: Duration,
    /// Parallel publishers per process
    pub worker_concurrency: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_millis(10_000),
            worker_concurrency: 8,
        }
    }
}

/// Complete fabric configuration for one module process
#[derive(Debug, Clone, Default)]
pub struct FabricConfig {
    pub outbox: OutboxConfig,
    pub inbox: InboxConfig,
    pub bus: BusConfig,
}

impl FabricConfig {
    /// Parse the fabric configuration from environment variables
    ///
    /// Unset variables fall back to defaults; a set-but-unparseable value
    /// is an error rather than a silent fallback.
    pub fn from_env() -> Result<Self, String> {
        Ok(FabricConfig {
            outbox: OutboxConfig {
                poll_interval: parse_ms("OUTBOX_POLL_INTERVAL_MS", 1000)?,
                batch_size: parse_var("OUTBOX_BATCH_SIZE", 100)?,
                max_attempts: parse_var("OUTBOX_MAX_ATTEMPTS", 10)?,
                base_backoff: parse_ms("OUTBOX_BASE_BACKOFF_MS", 2000)?,
                max_backoff: parse_ms("OUTBOX_MAX_BACKOFF_MS", 300_000)?,
                lease: parse_ms("OUTBOX_LEASE_MS", 30_000)?,
            },
            inbox: InboxConfig {
                poll_interval: parse_ms("INBOX_POLL_INTERVAL_MS", 5000)?,
                retention: Duration::from_secs(
                    parse_var::<u64>("INBOX_RETENTION_HOURS", 168)? * 3600,
                ),
                replay_enabled: parse_var("INBOX_REPLAY_ENABLED", true)?,
                quarantine_attempts: parse_var("INBOX_QUARANTINE_ATTEMPTS", 5)?,
            },
            bus: BusConfig {
                publish_timeout: parse_ms("BUS_PUBLISH_TIMEOUT_MS", 10_000)?,
                worker_concurrency: parse_var("BUS_WORKER_CONCURRENCY", 8)?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid value, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_ms(key: &str, default_ms: u64) -> Result<Duration, String> {
    Ok(Duration::from_millis(parse_var(key, default_ms)?))
}
