pub mod batch_repo;
