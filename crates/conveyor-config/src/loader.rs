//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File};
use conveyor_core::CoreError;
use std::path::Path;
use tracing::{debug, info};

/// Loads configuration from disk and the environment.
#[derive(Clone)]
pub struct ConfigLoader {
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a loader rooted at the given directory.
    pub fn new(config_dir: impl Into<String>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Creates a loader rooted at `./config`.
    pub fn from_default_location() -> Self {
        Self::new("./config")
    }

    /// Loads and validates the configuration.
    ///
    /// Sources, in order of precedence (later wins):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml`
    /// 3. `config/local.toml` (not committed)
    /// 4. Environment variables with the `CONVEYOR` prefix
    pub fn load(&self) -> Result<AppConfig, CoreError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var("CONVEYOR_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        let default_path = format!("{}/default.toml", self.config_dir);
        if Path::new(&default_path).exists() {
            debug!("Loading default config from: {}", default_path);
            builder = builder.add_source(File::with_name(&default_path).required(false));
        }

        let env_path = format!("{}/{}.toml", self.config_dir, environment);
        if Path::new(&env_path).exists() {
            debug!("Loading environment config from: {}", env_path);
            builder = builder.add_source(File::with_name(&env_path).required(false));
        }

        let local_path = format!("{}/local.toml", self.config_dir);
        if Path::new(&local_path).exists() {
            debug!("Loading local config from: {}", local_path);
            builder = builder.add_source(File::with_name(&local_path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("CONVEYOR")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error)?;
        let app_config: AppConfig = config.try_deserialize().map_err(config_error)?;

        Self::validate(&app_config)?;
        Ok(app_config)
    }

    fn validate(config: &AppConfig) -> Result<(), CoreError> {
        if config.database.url.is_empty() {
            return Err(CoreError::Configuration(
                "database.url is required (CONVEYOR__DATABASE__URL)".to_string(),
            ));
        }
        if config.database.min_connections > config.database.max_connections {
            return Err(CoreError::Configuration(
                "database.min_connections must be <= database.max_connections".to_string(),
            ));
        }
        config.jobs.validate().map_err(CoreError::from)?;
        Ok(())
    }
}

fn config_error(err: ConfigError) -> CoreError {
    CoreError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_database_url_rejected() {
        let config = AppConfig::default();
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_valid_config_accepted() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/conveyor".to_string();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_pool_bounds_checked() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/conveyor".to_string();
        config.database.min_connections = 20;
        config.database.max_connections = 10;
        assert!(ConfigLoader::validate(&config).is_err());
    }
}
