//! Configuration system for the receiver
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Code table overrides

use crate::codes::CodeTables;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CIDIP_CONFIG";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete receiver configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Receiver settings
    pub receiver: ReceiverSettings,

    /// TCP listener settings
    pub listener: ListenerSettings,

    /// Alarm logging settings
    pub alerts: AlertSettings,

    /// Extra code descriptions
    pub codes: CodeSettings,
}

/// Receiver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// TCP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerSettings {
    /// Interface to bind
    pub host: String,

    /// Port to bind (0 picks an ephemeral port)
    pub port: u16,

    /// Size of the per-connection read buffer in bytes
    pub read_buffer_size: usize,

    /// Close connections idle for this long (0 = never)
    pub idle_timeout_secs: u64,

    /// Maximum time a handler may take per event
    pub handler_timeout_ms: u64,
}

impl ListenerSettings {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            read_buffer_size: 1024,
            idle_timeout_secs: 0,
            handler_timeout_ms: 5000,
        }
    }
}

/// Alarm logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Client codes whose events are logged (empty = all)
    pub allowed_clients: Vec<String>,

    /// Log Service Test Reports as a one-line "Test ok"
    pub suppress_tests: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            allowed_clients: Vec::new(),
            suppress_tests: true,
        }
    }
}

/// Extra code descriptions, keyed by the code's digits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeSettings {
    pub events: BTreeMap<String, String>,
    pub qualifiers: BTreeMap<String, String>,
}

impl CodeSettings {
    fn parsed_events(&self) -> ConfigResult<Vec<(u16, String)>> {
        self.events
            .iter()
            .map(|(key, desc)| match key.trim().parse::<u16>() {
                Ok(code) if code <= 999 => Ok((code, desc.clone())),
                _ => Err(ConfigError::ValidationError(format!(
                    "Invalid event code: {:?}. Must be 0-999",
                    key
                ))),
            })
            .collect()
    }

    fn parsed_qualifiers(&self) -> ConfigResult<Vec<(u8, String)>> {
        self.qualifiers
            .iter()
            .map(|(key, desc)| match key.trim().parse::<u8>() {
                Ok(code) if code <= 9 => Ok((code, desc.clone())),
                _ => Err(ConfigError::ValidationError(format!(
                    "Invalid event qualifier: {:?}. Must be 0-9",
                    key
                ))),
            })
            .collect()
    }
}

impl ReceiverConfig {
    /// Built-in code tables extended with the configured overrides
    pub fn code_tables(&self) -> ConfigResult<CodeTables> {
        Ok(CodeTables::new()
            .with_event_codes(self.codes.parsed_events()?)
            .with_qualifiers(self.codes.parsed_qualifiers()?))
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. CIDIP_CONFIG environment variable
    /// 3. ~/.config/cidip/config.toml
    /// 4. /etc/cidip/config.toml
    /// 5. Default values
    ///
    /// `CIDIP_*` overrides and validation apply in every case, including
    /// when no file is found.
    pub fn load(&self) -> ConfigResult<ReceiverConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    fn load_with_env<F>(&self, lookup: F) -> ConfigResult<ReceiverConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.find_config_file(&lookup) {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                self.load_from_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                ReceiverConfig::default()
            }
        };

        self.apply_overrides(&mut config, &lookup);
        self.validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use
    fn find_config_file<F>(&self, lookup: &F) -> Option<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 1. CLI --config flag
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        // 2. CIDIP_CONFIG environment variable
        if let Some(env_path) = lookup(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("{} path does not exist: {}", CONFIG_ENV, env_path);
        }

        // 3. ~/.config/cidip/config.toml
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Some(path);
            }
        }

        // 4. /etc/cidip/config.toml (Unix only)
        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/cidip/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(&self, path: &Path) -> ConfigResult<ReceiverConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: ReceiverConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply `CIDIP_*` overrides read through `lookup`
    fn apply_overrides<F>(&self, config: &mut ReceiverConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CIDIP_LOG_LEVEL") {
            config.receiver.log_level = val;
        }

        if let Some(val) = lookup("CIDIP_HOST") {
            config.listener.host = val;
        }
        if let Some(val) = lookup("CIDIP_PORT") {
            match val.parse() {
                Ok(port) => config.listener.port = port,
                Err(_) => warn!("Ignoring invalid CIDIP_PORT: {}", val),
            }
        }
        if let Some(val) = lookup("CIDIP_IDLE_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => config.listener.idle_timeout_secs = secs,
                Err(_) => warn!("Ignoring invalid CIDIP_IDLE_TIMEOUT_SECS: {}", val),
            }
        }

        if let Some(val) = lookup("CIDIP_ALLOWED_CLIENTS") {
            config.alerts.allowed_clients = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Validate configuration
    fn validate(&self, config: &ReceiverConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.receiver.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.receiver.log_level, valid_levels
            )));
        }

        if config.listener.read_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "Read buffer size cannot be 0".to_string(),
            ));
        }

        if config.listener.handler_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Handler timeout cannot be 0".to_string(),
            ));
        }

        config.code_tables()?;

        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("cidip").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper module for platform-specific directories
mod dirs {
    use std::path::PathBuf;

    /// Get the user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
