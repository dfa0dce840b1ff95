//! Configuration Loader
//!
//! Layered loading of [`CoreConfig`] through the `config` crate. Sources, from
//! lowest to highest precedence:
//!
//! 1. [`DEFAULT_CORE_SETTINGS`]
//! 2. an optional core settings file (JSON, TOML or YAML by extension)
//! 3. `BATCHSYNC__SECTION__KEY` environment variables
//! 4. the `core` object embedded in the job document

use super::error::{ConfigResult, ConfigurationError};
use super::job::Configuration;
use super::{CoreConfig, DEFAULT_CORE_SETTINGS};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "BATCHSYNC";

/// Loaded and validated core settings plus the environment they were loaded for
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: CoreConfig,
    environment: String,
}

impl ConfigManager {
    /// Load core settings from every source
    pub fn load(core_file: Option<&Path>, job_overrides: Option<&Configuration>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        let mut builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CORE_SETTINGS, FileFormat::Json));

        if let Some(path) = core_file {
            if !path.is_file() {
                return Err(ConfigurationError::file_read_error(
                    path.display().to_string(),
                    "not a regular file",
                ));
            }
            debug!(core_file = %path.display(), "Adding core settings file");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        if let Some(overrides) = job_overrides {
            debug!("Applying core overrides from job document");
            builder = builder.add_source(File::from_str(&overrides.to_json(), FileFormat::Json));
        }

        let config: CoreConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            channel_capacity = config.transport.channel.capacity,
            channels_per_group = config.container.task_group.channel,
            max_retry_times = config.container.task.max_retry_times,
            "⚙️ Core settings loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
        }))
    }

    /// Wrap already-built settings, validating them first
    pub fn from_config(config: CoreConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
        }))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("BATCHSYNC_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}
