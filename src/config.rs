use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LifelineConfig {
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Seconds to wait for the root component to report started
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,

    /// Seconds to wait for the root component to finish stopping
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl LifecycleConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            start_timeout_secs: default_start_timeout_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LifelineConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("lifeline.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("lifecycle.start_timeout_secs", default_start_timeout_secs())?
            .set_default("lifecycle.stop_timeout_secs", default_stop_timeout_secs())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", "pretty")?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Field names contain underscores, so sections are split on a double one:
            // LIFELINE_LIFECYCLE__STOP_TIMEOUT_SECS
            .add_source(Environment::with_prefix("LIFELINE").prefix_separator("_").separator("__"))
            .build()?;

        let config: LifelineConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.start_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Lifecycle start_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.stop_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Lifecycle stop_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Message(
                "Logging level must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for LifelineConfig {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// Default value functions
fn default_start_timeout_secs() -> u64 {
    30
}
fn default_stop_timeout_secs() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
