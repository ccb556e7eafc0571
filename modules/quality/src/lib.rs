pub mod adapters;
pub mod config;
pub mod contracts;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod health;
pub mod models;
pub mod repos;
pub mod services;
