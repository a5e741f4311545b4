//! Configuration management
//!
//! This module handles loading, validation, and management of the client
//! configuration. Configuration is stored in TOML format at
//! ~/.quant-copilot/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **backend**: Backend base URL and request timeout
//! - **tracker**: Backtest status polling cadence
//! - **conversation**: Optional bound on the message log
//!
//! # Overrides
//!
//! After the file is parsed, the `COPILOT_BACKEND_URL` environment variable
//! replaces `backend.base_url`. The `--backend-url` CLI flag is applied last
//! through [`Config::set_backend_url`].
//!
//! # Examples
//!
//! ```no_run
//! use copilot_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Backend: {}", config.backend.base_url);
//! # Ok(())
//! # }
//! ```

use sdk::errors::ClientError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `backend.base_url`
pub const BACKEND_URL_ENV: &str = "COPILOT_BACKEND_URL";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core client settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Job tracker settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Conversation log settings
    #[serde(default)]
    pub conversation: ConversationConfig,
}

/// Core client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the research backend (no trailing slash)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for a single HTTP request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Job tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Delay between two status checks of the tracked backtest (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Conversation log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Keep at most this many messages, evicting the oldest. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    1500
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from the default location (~/.quant-copilot/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or written
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, ClientError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ClientError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_toml_str(contents: &str) -> Result<Self, ClientError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| ClientError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, ClientError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClientError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let defaults = Self::default();

        // The file keeps the plain defaults; env overrides apply only in memory
        let toml_string = toml::to_string_pretty(&defaults)
            .map_err(|e| ClientError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ClientError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = defaults;
        config.apply_env_overrides();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.quant-copilot/config.toml)
    pub fn default_config_path() -> Result<PathBuf, ClientError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ClientError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".quant-copilot").join("config.toml"))
    }

    /// Replace the backend base URL (used for the `--backend-url` flag)
    pub fn set_backend_url(&mut self, url: impl Into<String>) -> Result<(), ClientError> {
        self.backend.base_url = url.into();
        self.validate_and_process()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!("Backend URL overridden by {}", BACKEND_URL_ENV);
                self.backend.base_url = url;
            }
        }
    }

    /// Validate and normalize configuration values
    fn validate_and_process(&mut self) -> Result<(), ClientError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(ClientError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let base_url = self.backend.base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "Invalid backend base_url '{}'. Must start with http:// or https://",
                self.backend.base_url
            )));
        }
        self.backend.base_url = base_url.to_string();

        if self.backend.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.tracker.poll_interval_ms == 0 {
            return Err(ClientError::Config(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.conversation.max_messages == Some(0) {
            return Err(ClientError::Config(
                "max_messages must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}
