//! Cache subsystem configuration.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_KEY_PREFIX: &str = "fomento";
const DEFAULT_VERSION: u32 = 1;
const DEFAULT_DETAIL_TTL_SECONDS: u64 = 300;
const DEFAULT_LISTING_TTL_SECONDS: u64 = 60;
// Epochs may expire without harm: a reset epoch only changes listing keys,
// which reads repopulate on the next miss.
const DEFAULT_EPOCH_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Tuning for key construction and invalidation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching; when off, the facade still works but the bus and
    /// registry short-circuit their store traffic.
    pub enabled: bool,
    /// Global namespace every key starts with.
    pub key_prefix: String,
    /// Cache format version; bumping it makes every existing key unreachable.
    pub version: u32,
    /// TTL for detail (single entity) payloads, seconds.
    pub detail_ttl_seconds: u64,
    /// TTL for listing payloads, seconds.
    pub listing_ttl_seconds: u64,
    /// TTL for listing epoch counters, seconds.
    pub epoch_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            version: DEFAULT_VERSION,
            detail_ttl_seconds: DEFAULT_DETAIL_TTL_SECONDS,
            listing_ttl_seconds: DEFAULT_LISTING_TTL_SECONDS,
            epoch_ttl_seconds: DEFAULT_EPOCH_TTL_SECONDS,
        }
    }
}

impl CacheConfig {
    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_seconds)
    }

    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_seconds)
    }

    pub fn epoch_ttl(&self) -> Duration {
        Duration::from_secs(self.epoch_ttl_seconds)
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            key_prefix: settings.key_prefix.clone(),
            version: settings.version,
            detail_ttl_seconds: settings.detail_ttl_seconds,
            listing_ttl_seconds: settings.listing_ttl_seconds,
            epoch_ttl_seconds: settings.epoch_ttl_seconds,
        }
    }
}
