//! Configuration layer: typed settings with layered precedence (defaults → file → env).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const ENV_PREFIX: &str = "FOMENTO";
const LOCAL_CONFIG_BASENAME: &str = "fomento";

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/fomento";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_STORE_OP_TIMEOUT_MS: u64 = 30;
const DEFAULT_STORE_MAX_ENTRIES: usize = 10_000;
const DEFAULT_WRITE_MAX_REQUESTS: u32 = 30;
const DEFAULT_WRITE_WINDOW_SECS: u64 = 60;
const DEFAULT_SENSITIVE_MAX_REQUESTS: u32 = 120;
const DEFAULT_SENSITIVE_WINDOW_SECS: u64 = 60;
const DEFAULT_SLUG_MAX_LENGTH: usize = 64;
const DEFAULT_SLUG_MAX_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl SettingsError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Root settings for everything the infrastructure core needs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub slug: SlugSettings,
    pub search: SearchSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings with layered precedence: baked-in defaults, then an
    /// optional TOML file (`fomento.toml` when no explicit path is given),
    /// then `FOMENTO_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();

        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false)),
        };

        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cache.key_prefix.trim().is_empty() {
            return Err(SettingsError::invalid("cache.key_prefix must not be empty"));
        }
        if self.cache.version == 0 {
            return Err(SettingsError::invalid("cache.version must be at least 1"));
        }
        if self.slug.max_length < 8 {
            return Err(SettingsError::invalid("slug.max_length must be at least 8"));
        }
        if self.slug.max_attempts == 0 {
            return Err(SettingsError::invalid("slug.max_attempts must be at least 1"));
        }
        for (name, rule) in [
            ("rate_limit.write", &self.rate_limit.write),
            ("rate_limit.sensitive", &self.rate_limit.sensitive),
        ] {
            if rule.window_seconds == 0 {
                return Err(SettingsError::invalid(format!(
                    "{name}.window_seconds must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub key_prefix: String,
    /// Cache format version embedded into every key; bump to invalidate
    /// every previously cached value without touching the store.
    pub version: u32,
    pub detail_ttl_seconds: u64,
    pub listing_ttl_seconds: u64,
    pub epoch_ttl_seconds: u64,
    /// Per-operation timeout against the shared store, milliseconds.
    pub op_timeout_ms: u64,
    pub backend: CacheBackendSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let cache = crate::cache::CacheConfig::default();
        Self {
            enabled: cache.enabled,
            key_prefix: cache.key_prefix,
            version: cache.version,
            detail_ttl_seconds: cache.detail_ttl_seconds,
            listing_ttl_seconds: cache.listing_ttl_seconds,
            epoch_ttl_seconds: cache.epoch_ttl_seconds,
            op_timeout_ms: DEFAULT_STORE_OP_TIMEOUT_MS,
            backend: CacheBackendSettings::default(),
        }
    }
}

impl CacheSettings {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Which key/value store backend to use.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheBackendSettings {
    /// In-process store; the fallback when no shared tier is deployed.
    Memory {
        #[serde(default = "default_store_max_entries")]
        max_entries: usize,
    },
    /// Shared Redis tier for multi-instance deployments.
    Redis { url: String },
}

fn default_store_max_entries() -> usize {
    DEFAULT_STORE_MAX_ENTRIES
}

impl Default for CacheBackendSettings {
    fn default() -> Self {
        Self::Memory {
            max_entries: DEFAULT_STORE_MAX_ENTRIES,
        }
    }
}

/// One fixed-window threshold.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Skip rate limiting entirely; for automated-test environments.
    pub bypass: bool,
    /// Threshold for mutating handlers.
    pub write: RateLimitRule,
    /// Threshold for expensive read handlers.
    pub sensitive: RateLimitRule,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            bypass: false,
            write: RateLimitRule {
                max_requests: DEFAULT_WRITE_MAX_REQUESTS,
                window_seconds: DEFAULT_WRITE_WINDOW_SECS,
            },
            sensitive: RateLimitRule {
                max_requests: DEFAULT_SENSITIVE_MAX_REQUESTS,
                window_seconds: DEFAULT_SENSITIVE_WINDOW_SECS,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlugSettings {
    /// Width of the slug column, including room reserved for suffixes.
    pub max_length: usize,
    pub max_attempts: u32,
}

impl Default for SlugSettings {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_SLUG_MAX_LENGTH,
            max_attempts: DEFAULT_SLUG_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Whether the storage backend supports ranked full-text search; when
    /// false the engine runs substring fallback for every query.
    pub ranked: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { ranked: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
