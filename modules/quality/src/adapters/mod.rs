pub mod batch_completed;

pub use batch_completed::batch_completed_adapter;
