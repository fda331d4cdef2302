#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod config;
pub mod domain;
pub mod error;
pub mod errors;
pub mod protocol;
pub mod server;
pub mod telemetry;

// Re-exports for public API
pub use config::ServerConfig;
pub use error::AppError;
pub use server::listener::run_listener;
pub use server::registry::Registry;
