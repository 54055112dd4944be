pub mod config;
pub mod converter;
pub mod errors;
pub mod kernel;
pub mod rest_client;
pub mod traits;
pub mod types;
pub mod ws_client;
