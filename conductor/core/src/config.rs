//! TOML Configuration File Support
//!
//! Configuration for the chat engine, loaded from
//! `$XDG_CONFIG_HOME/docchat/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are applied with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//! request_timeout_secs = 60
//!
//! [typewriter]
//! interval_ms = 30
//!
//! [upload]
//! tick_ms = 200
//! step_percent = 20
//! cap_percent = 90
//! settle_ms = 500
//!
//! [fallback]
//! enabled = true
//! query_delay_ms = 1000
//! upload_delay_ms = 1500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default answering service address
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the service address came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[api]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Answering service base URL
    pub base_url: Option<String>,
    /// Overall request timeout in seconds (absent = none)
    pub request_timeout_secs: Option<u64>,
}

/// `[typewriter]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TypewriterToml {
    /// Delay between revealed characters in milliseconds
    pub interval_ms: Option<u64>,
}

/// `[upload]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadToml {
    /// Delay between simulated progress steps in milliseconds
    pub tick_ms: Option<u64>,
    /// Percentage added per step
    pub step_percent: Option<u8>,
    /// Highest simulated percentage before confirmation
    pub cap_percent: Option<u8>,
    /// How long 100% stays visible in milliseconds
    pub settle_ms: Option<u64>,
}

/// `[fallback]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackToml {
    /// Answer locally when the service is unreachable
    pub enabled: Option<bool>,
    /// Delay before a synthetic answer in milliseconds
    pub query_delay_ms: Option<u64>,
    /// Delay before a synthetic upload succeeds in milliseconds
    pub upload_delay_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Service settings
    pub api: ApiToml,
    /// Reveal settings
    pub typewriter: TypewriterToml,
    /// Upload simulation settings
    pub upload: UploadToml,
    /// Offline fallback settings
    pub fallback: FallbackToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Resolved engine configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ChatConfig {
    /// Answering service base URL
    pub base_url: String,
    /// Overall request timeout (none by default)
    pub request_timeout: Option<Duration>,
    /// Delay between revealed characters
    pub reveal_interval: Duration,
    /// Delay between simulated upload progress steps
    pub upload_tick: Duration,
    /// Percentage added per progress step
    pub upload_step_percent: u8,
    /// Highest simulated percentage before confirmation
    pub upload_cap_percent: u8,
    /// How long 100% stays visible before completion is reported
    pub upload_settle: Duration,
    /// Answer locally when the service is unreachable
    pub fallback_enabled: bool,
    /// Delay before a synthetic answer
    pub fallback_query_delay: Duration,
    /// Delay before a synthetic upload succeeds
    pub fallback_upload_delay: Duration,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of the base URL
    source: ConfigSource,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: None,
            reveal_interval: Duration::from_millis(30),
            upload_tick: Duration::from_millis(200),
            upload_step_percent: 20,
            upload_cap_percent: 90,
            upload_settle: Duration::from_millis(500),
            fallback_enabled: true,
            fallback_query_delay: Duration::from_millis(1000),
            fallback_upload_delay: Duration::from_millis(1500),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ChatConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the base URL came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the base URL source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

        if self.base_url.trim().is_empty() {
            return invalid("base_url must not be empty");
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "base_url must start with http:// or https:// (got {})",
                self.base_url
            )));
        }
        if self.reveal_interval.is_zero() {
            return invalid("typewriter interval must be greater than zero");
        }
        if self.upload_tick.is_zero() {
            return invalid("upload tick must be greater than zero");
        }
        if self.upload_step_percent == 0 {
            return invalid("upload step_percent must be greater than zero");
        }
        if self.upload_cap_percent >= 100 {
            return invalid("upload cap_percent must be below 100");
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return invalid("request timeout must be greater than zero");
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/docchat/config.toml` or
/// `~/.config/docchat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("docchat").join("config.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting values are invalid. A missing file is not an error.
pub async fn load_config() -> Result<ChatConfig, ConfigError> {
    load_config_from_path(default_config_path().as_deref()).await
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Same as [`load_config`].
pub async fn load_config_from_path(path: Option<&Path>) -> Result<ChatConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok()).await
}

/// Load configuration with a custom environment lookup
///
/// # Errors
///
/// Same as [`load_config`].
pub async fn load_config_with_env<F>(path: Option<&Path>, env: F) -> Result<ChatConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ChatConfig::default();

    if let Some(config_path) = path {
        match tokio::fs::read_to_string(config_path).await {
            Ok(toml_content) => {
                let toml_config: ChatToml = toml::from_str(&toml_content)?;
                apply_toml_config(&mut config, &toml_config);
                config.config_file_path = Some(config_path.to_path_buf());

                tracing::info!(
                    path = %config_path.display(),
                    "Loaded configuration from file"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    path = %config_path.display(),
                    "Config file not found, using defaults"
                );
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: config_path.to_path_buf(),
                    source,
                });
            }
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ChatConfig, toml: &ChatToml) {
    if let Some(ref url) = toml.api.base_url {
        config.base_url = url.clone();
        config.source = ConfigSource::File;
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.request_timeout = Some(Duration::from_secs(secs));
    }

    if let Some(ms) = toml.typewriter.interval_ms {
        config.reveal_interval = Duration::from_millis(ms);
    }

    if let Some(ms) = toml.upload.tick_ms {
        config.upload_tick = Duration::from_millis(ms);
    }
    if let Some(step) = toml.upload.step_percent {
        config.upload_step_percent = step;
    }
    if let Some(cap) = toml.upload.cap_percent {
        config.upload_cap_percent = cap;
    }
    if let Some(ms) = toml.upload.settle_ms {
        config.upload_settle = Duration::from_millis(ms);
    }

    if let Some(enabled) = toml.fallback.enabled {
        config.fallback_enabled = enabled;
    }
    if let Some(ms) = toml.fallback.query_delay_ms {
        config.fallback_query_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.fallback.upload_delay_ms {
        config.fallback_upload_delay = Duration::from_millis(ms);
    }
}

/// Apply environment variable overrides to the config
///
/// Environment variables:
/// - `DOCCHAT_API_URL` (or `NEXT_PUBLIC_API_URL`): service base URL
/// - `DOCCHAT_REVEAL_MS`: typewriter interval in ms
/// - `DOCCHAT_REQUEST_TIMEOUT_SECS`: request timeout in seconds
/// - `DOCCHAT_DISABLE_FALLBACK`: "1" or "true" to surface unreachable errors
fn apply_env_config<F>(config: &mut ChatConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("DOCCHAT_API_URL").or_else(|| env("NEXT_PUBLIC_API_URL")) {
        if !url.trim().is_empty() {
            config.base_url = url;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(ms) = env("DOCCHAT_REVEAL_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.reveal_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = env("DOCCHAT_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
        config.request_timeout = Some(Duration::from_secs(secs));
    }
    if let Some(disabled) = env("DOCCHAT_DISABLE_FALLBACK") {
        config.fallback_enabled = !(disabled == "1" || disabled.eq_ignore_ascii_case("true"));
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`], then call [`ChatConfig::validate`] again.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Typewriter interval override (milliseconds)
    pub reveal_ms: Option<u64>,

    /// Request timeout override (seconds)
    pub request_timeout_secs: Option<u64>,

    /// Disable the offline fallback
    pub disable_fallback: bool,
}

impl ConfigOverrides {
    /// Create empty overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set typewriter interval override
    #[must_use]
    pub fn with_reveal_ms(mut self, ms: u64) -> Self {
        self.reveal_ms = Some(ms);
        self
    }

    /// Set request timeout override
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Disable the offline fallback
    #[must_use]
    pub fn with_fallback_disabled(mut self) -> Self {
        self.disable_fallback = true;
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ChatConfig) {
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
            config.source = ConfigSource::Cli;
        }
        if let Some(ms) = self.reveal_ms {
            config.reveal_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        if self.disable_fallback {
            config.fallback_enabled = false;
        }
    }
}
