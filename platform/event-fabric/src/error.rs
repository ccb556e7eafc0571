//! Fabric error taxonomy
//!
//! Every fabric operation returns an explicit `Result`; panics are reserved
//! for invariant violations. The taxonomy drives the retry decision at each
//! consumption site: transient errors go through backoff, schema/contract
//! errors go terminal, and business-idempotent outcomes map to success.

use event_bus::BusError;
use thiserror::Error;

/// Classification of a fabric failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network timeout, broker unavailable, DB deadlock: retry with backoff
    Transient,
    /// Unknown event type, unparseable payload, schemaVersion too new:
    /// never retried
    Schema,
    /// Authorization denied by the bus, malformed envelope: never retried
    Contract,
    /// Duplicate key on write, "already processed": mapped to success
    BusinessIdempotent,
    /// Invariant violation inside a listener: surfaces as listener failure
    BusinessFatal,
}

/// Error type for all fabric operations
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("contract violation: {0}")]
    Contract(String),

    #[error("effect already applied: {0}")]
    BusinessIdempotent(String),

    #[error("listener failure: {0}")]
    BusinessFatal(String),
}

/// Result type for fabric operations
pub type FabricResult<T> = Result<T, FabricError>;

impl FabricError {
    /// The taxonomy bucket this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            FabricError::Transient(_) => ErrorKind::Transient,
            FabricError::Schema(_) => ErrorKind::Schema,
            FabricError::Contract(_) => ErrorKind::Contract,
            FabricError::BusinessIdempotent(_) => ErrorKind::BusinessIdempotent,
            FabricError::BusinessFatal(_) => ErrorKind::BusinessFatal,
        }
    }

    /// Whether a retry with backoff can possibly succeed
    ///
    /// Business-fatal errors are retryable from the bus's point of view:
    /// the inbox row stays PENDING and redelivery may succeed once the
    /// business precondition is repaired. Schema and contract failures
    /// never will.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transient | ErrorKind::BusinessFatal
        )
    }
}

impl From<BusError> for FabricError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::PublishError(m) | BusError::ConnectionError(m) | BusError::InternalError(m) => {
                FabricError::Transient(m)
            }
            BusError::SubscribeError(m) => FabricError::Transient(m),
            BusError::SerializationError(m) => FabricError::Schema(m),
            BusError::InvalidSubject(m) => FabricError::Contract(m),
        }
    }
}

impl From<sqlx::Error> for FabricError {
    fn from(err: sqlx::Error) -> Self {
        if crate::idempotency::is_unique_violation(&err) {
            return FabricError::BusinessIdempotent(err.to_string());
        }
        // Unknown database errors default to transient so a deadlock or a
        // dropped connection gets retried; the log line carries enough to
        // tighten the classification later.
        FabricError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for FabricError {
    fn from(err: serde_json::Error) -> Self {
        FabricError::Schema(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert!(FabricError::Transient("timeout".into()).is_retryable());
        assert!(FabricError::BusinessFatal("invariant".into()).is_retryable());
    }

    #[test]
    fn test_schema_and_contract_are_terminal() {
        assert!(!FabricError::Schema("bad payload".into()).is_retryable());
        assert!(!FabricError::Contract("denied".into()).is_retryable());
    }

    #[test]
    fn test_bus_error_classification() {
        let publish = FabricError::from(BusError::PublishError("down".into()));
        assert_eq!(publish.kind(), ErrorKind::Transient);

        let serialization = FabricError::from(BusError::SerializationError("bad".into()));
        assert_eq!(serialization.kind(), ErrorKind::Schema);

        let subject = FabricError::from(BusError::InvalidSubject("..".into()));
        assert_eq!(subject.kind(), ErrorKind::Contract);
    }

    #[test]
    fn test_serde_error_is_schema() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(FabricError::from(err).kind(), ErrorKind::Schema);
    }
}
