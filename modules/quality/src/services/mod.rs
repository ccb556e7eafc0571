pub mod results_service;
