//! Idempotency guards for command handlers and repositories
//!
//! The consumer-side layers of defense-in-depth. Any one of them suffices
//! for correctness; together with the adapter replay skip they close every
//! duplicate race:
//!
//! 1. Adapter: skip on inbox replay ([`crate::IntegrationAdapter`])
//! 2. Command handler: check the natural key before acting
//!    ([`handle_idempotent`])
//! 3. Repository: unique-constraint violation on insert is success
//!    ([`is_unique_violation`])

use crate::error::{FabricError, FabricResult};
use std::future::Future;

/// Postgres unique-violation SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

/// Whether a database error is a unique-constraint violation
///
/// Repositories doing idempotent inserts treat this as success: the row
/// the command wanted to create already exists, so the effect is present.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| code == UNIQUE_VIOLATION)
            .unwrap_or(false),
        _ => false,
    }
}

/// Outcome of an idempotent command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The effect was performed by this invocation
    Performed,
    /// The effect was already present; nothing changed
    AlreadyApplied,
}

/// Run a command at most once per natural key
///
/// Checks `exists` first and short-circuits to success when the effect is
/// already present. If the action itself loses a race and reports
/// [`FabricError::BusinessIdempotent`] (the repository layer mapping a
/// unique violation), that is also success. Everything else propagates.
///
/// ```rust
/// use event_fabric::idempotency::{handle_idempotent, Applied};
/// use event_fabric::FabricResult;
///
/// # async fn example() -> FabricResult<()> {
/// let outcome = handle_idempotent(
///     || async { Ok(false) },              // exists(batch_id)?
///     || async { Ok(()) },                 // create the batch
/// )
/// .await?;
/// assert_eq!(outcome, Applied::Performed);
/// # Ok(())
/// # }
/// ```
pub async fn handle_idempotent<E, EFut, A, AFut>(exists: E, action: A) -> FabricResult<Applied>
where
    E: FnOnce() -> EFut,
    EFut: Future<Output = FabricResult<bool>>,
    A: FnOnce() -> AFut,
    AFut: Future<Output = FabricResult<()>>,
{
    if exists().await? {
        tracing::info!("Effect already present, command treated as success");
        return Ok(Applied::AlreadyApplied);
    }

    match action().await {
        Ok(()) => Ok(Applied::Performed),
        Err(FabricError::BusinessIdempotent(detail)) => {
            // Lost the race to a concurrent duplicate; same end state
            tracing::info!(detail = %detail, "Concurrent duplicate write, command treated as success");
            Ok(Applied::AlreadyApplied)
        }
        Err(e) => Err(e),
    }
}
