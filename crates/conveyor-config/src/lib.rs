//! Layered configuration for Conveyor binaries.
//!
//! Configuration is loaded from `config/default.toml`, then
//! `config/{environment}.toml`, then `config/local.toml`, then environment
//! variables with the `CONVEYOR` prefix (`__` as the section separator, e.g.
//! `CONVEYOR__DATABASE__URL`).

mod app_config;
mod loader;

pub use app_config::{AppConfig, AppSection, DatabaseConfig, ServerConfig};
pub use loader::ConfigLoader;
