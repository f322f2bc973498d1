//! # Configuration Management for Feedhaus
//!
//! This crate provides centralized configuration structures for all Feedhaus components:
//! the shared cache store, the upstream rate governors and the secret codec.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{CacheConfig, RateConfig, SecretConfig};
//!
//! let cache_config = CacheConfig::new("redis://localhost:6379/0".to_string(), 300, "dashboard".to_string());
//! let rate_config = RateConfig::new(5000, 60);
//! let secret_config = SecretConfig::default();
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [cache]
//! redis_url = "redis://localhost:6379/0"
//! default_ttl = 300
//! key_prefix = "dashboard"
//! connection_timeout_ms = 5000
//! coalesce_misses = false
//!
//! [rate]
//! limit = 5000
//! reset_buffer_seconds = 60
//!
//! [secrets]
//! encryption_key = "<url-safe base64, 32 bytes>"
//! ```
//!
//! Every section and field is optional; missing values fall back to defaults.
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from FEEDHAUS_CONFIG or ./feedhaus.toml
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

use serde::{Deserialize, Serialize};
use std::{env, path::Path, time::Duration};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./feedhaus.toml";
const CONFIG_PATH_VAR: &str = "FEEDHAUS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub rate: RateConfig,
    pub secrets: SecretConfig,
}

/// Shared key-value cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis connection string (redis://localhost:6379/0)
    pub redis_url: String,

    /// TTL applied when a caller supplies none (in seconds)
    pub default_ttl: u64,

    /// Namespace used when a caller supplies none
    pub key_prefix: String,

    /// Connection timeout in milliseconds
    pub connection_timeout_ms: u64,

    /// Serialize concurrent misses on the same key within this process
    pub coalesce_misses: bool,
}

/// Upstream rate budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Budget assumed before the first observation
    pub limit: u64,

    /// Safety margin added past the upstream reset instant
    pub reset_buffer_seconds: u64,
}

/// Secret codec configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretConfig {
    /// URL-safe base64 encoded 32-byte key
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for SecretConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretConfig")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the TOML file named in the environment, or defaults
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is normal outside development
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let mut config = if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            Self::read_file(&config_path)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::read_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `REDIS_URL`, `CACHE_DEFAULT_TTL` and `ENCRYPTION_KEY` from the environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REDIS_URL") {
            self.cache.redis_url = url;
        }
        if let Some(ttl) = lookup("CACHE_DEFAULT_TTL") {
            self.cache.default_ttl = ttl.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("CACHE_DEFAULT_TTL is not a number: {}", ttl))
            })?;
        }
        if let Some(key) = lookup("ENCRYPTION_KEY") {
            if !key.is_empty() {
                self.secrets.encryption_key = Some(key);
            }
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Cache validations
        if self.cache.redis_url.is_empty() {
            return Err(ConfigError::Invalid(
                "Redis URL cannot be empty".to_string(),
            ));
        }
        if self.cache.default_ttl == 0 {
            return Err(ConfigError::Invalid(
                "Cache default_ttl must be greater than 0".to_string(),
            ));
        }
        if self.cache.key_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "Cache key_prefix cannot be empty".to_string(),
            ));
        }
        if self.cache.connection_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Cache connection_timeout_ms must be greater than 0".to_string(),
            ));
        }

        // Rate validations
        if self.rate.limit == 0 {
            return Err(ConfigError::Invalid(
                "Rate limit must be greater than 0".to_string(),
            ));
        }

        // Secret validations
        if let Some(key) = &self.secrets.encryption_key {
            if key.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "Encryption key cannot be blank when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl CacheConfig {
    /// Create a new cache configuration
    pub fn new(redis_url: String, default_ttl: u64, key_prefix: String) -> Self {
        Self {
            redis_url,
            default_ttl,
            key_prefix,
            ..Self::default()
        }
    }

    pub fn with_connection_timeout(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    pub fn with_coalesced_misses(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    /// Get TTL as Duration
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            default_ttl: 300,
            key_prefix: "dashboard".to_string(),
            connection_timeout_ms: 5000,
            coalesce_misses: false,
        }
    }
}

impl RateConfig {
    /// Create a new rate configuration
    pub fn new(limit: u64, reset_buffer_seconds: u64) -> Self {
        Self {
            limit,
            reset_buffer_seconds,
        }
    }

    pub fn reset_buffer(&self) -> Duration {
        Duration::from_secs(self.reset_buffer_seconds)
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            limit: 5000,
            reset_buffer_seconds: 60,
        }
    }
}

impl SecretConfig {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            encryption_key: Some(key.into()),
        }
    }
}
