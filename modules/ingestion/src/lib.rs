pub mod config;
pub mod contracts;
pub mod db;
pub mod health;
pub mod models;
pub mod repos;
pub mod services;

pub use services::batch_service::complete_batch;
