pub mod batch_service;
