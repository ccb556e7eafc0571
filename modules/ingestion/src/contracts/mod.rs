//! Integration event contracts owned by the ingestion module
//!
//! The serialized payload is the wire contract consumed by other modules;
//! evolve it additively only, behind a schemaVersion bump.

pub mod batch_completed_v1;

pub use batch_completed_v1::{BatchCompletedV1, BATCH_COMPLETED_SCHEMA_VERSION, BATCH_COMPLETED_TYPE};
