//! Configuration loading
//!
//! Sources, later ones win:
//! 1. Built-in defaults
//! 2. `.env` (via dotenvy, only fills unset variables)
//! 3. TOML file: explicit path, else `ROUTINE_CONFIG_PATH`, else `routine.toml` if present
//! 4. Environment variables: `ROUTINE_RUNTIME__DEFERRED_TIMEOUT_MS=500`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "ROUTINE";
pub const CONFIG_PATH_ENV: &str = "ROUTINE_CONFIG_PATH";
pub const DEFAULT_CONFIG_FILE: &str = "routine.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config file not found: {0}")]
    MissingFile(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Deferred results taking longer than this fail with a timeout error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_timeout_ms: Option<u64>,

    #[serde(default = "default_true")]
    pub forward_final_command: bool,

    #[serde(default)]
    pub trace_commands: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            deferred_timeout_ms: None,
            forward_final_command: true,
            trace_commands: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Parse a TOML document on its own, without env or file lookup
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.deferred_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "runtime.deferred_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for loading a [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    deferred_timeout_ms: Option<u64>,
    dotenv_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Use this file instead of searching; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Override the deferred timeout after all sources are applied
    pub fn deferred_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.deferred_timeout_ms = timeout_ms;
        self
    }

    /// Read this dotenv file instead of searching for `.env`
    pub fn dotenv_path(mut self, path: Option<PathBuf>) -> Self {
        self.dotenv_path = path;
        self
    }

    /// Ignore `.env` and `ROUTINE_*` variables
    pub fn skip_env(mut self, skip: bool) -> Self {
        self.skip_env = skip;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        if !self.skip_env {
            match &self.dotenv_path {
                Some(path) => {
                    dotenvy::from_path(path).ok();
                }
                None => {
                    dotenvy::dotenv().ok();
                }
            }
        }

        let mut builder = config::Config::builder();

        let explicit = self.config_path.or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
            }
        });

        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path));
                }
                builder = builder.add_source(
                    config::File::from(path)
                        .format(config::FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                builder = builder.add_source(
                    config::File::with_name(DEFAULT_CONFIG_FILE)
                        .format(config::FileFormat::Toml)
                        .required(false),
                );
            }
        }

        if !self.skip_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: Config = builder.build()?.try_deserialize()?;

        if let Some(timeout_ms) = self.deferred_timeout_ms {
            config.runtime.deferred_timeout_ms = Some(timeout_ms);
        }

        config.validate()?;
        Ok(config)
    }
}
