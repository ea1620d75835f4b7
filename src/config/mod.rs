//! Configuration management module.
//!
//! Supports loading configuration from:
//! - TOML files (config/default.toml, config/{profile}.toml)
//! - Environment variables with `IDMAKER_WORKER__<SECTION>__<KEY>` pattern

mod generator;
mod server;
mod storage;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use generator::{BufferConfig, RetryConfig, SegmentConfig, SnowflakeConfig};
pub use server::ServerConfig;
pub use storage::{
    FileStorageConfig, RedisStorageConfig, SqlStoreConfig, StorageBackend, StorageConfig,
};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Shared range store configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Snowflake generator configuration.
    #[serde(default)]
    pub snowflake: SnowflakeConfig,

    /// Segment allocator configuration.
    #[serde(default)]
    pub segment: SegmentConfig,

    /// Double buffer configuration, applied to every pool and every refill.
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{IDMAKER_PROFILE}.toml` (if `IDMAKER_PROFILE` is set)
    /// 3. Environment variables with `IDMAKER_WORKER__` prefix
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let profile =
            std::env::var("IDMAKER_PROFILE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{profile}")).required(false))
            // IDMAKER_WORKER__SNOWFLAKE__MACHINE_ID=7 -> snowflake.machine_id = 7
            .add_source(
                Environment::with_prefix("IDMAKER_WORKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port cannot be 0".to_string()));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "server.request_timeout_ms cannot be 0".to_string(),
            ));
        }

        self.storage.validate()?;
        self.snowflake.validate()?;
        self.segment.validate()?;
        self.buffer.validate()?;

        Ok(())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Install the Prometheus recorder and expose it on `/metrics`.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

const fn default_metrics_enabled() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_enabled: true,
        }
    }
}
