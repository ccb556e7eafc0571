pub mod announce_validation;
pub mod register_batch;

pub use announce_validation::AnnounceValidationStart;
pub use register_batch::RegisterReceivedBatch;
