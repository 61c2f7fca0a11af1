pub mod config;
pub mod metrics;
pub mod peloton_client;
pub mod secrets;
pub mod types;
