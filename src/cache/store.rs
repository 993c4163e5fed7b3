//! Key/value store abstraction and the in-process fallback implementation.
//!
//! The core is built against [`KeyValueStore`]: four atomic operations with
//! TTLs, matching what a distributed cache offers. [`MemoryStore`] is the
//! in-process backend used when no external store is configured and in
//! tests; the Redis-backed implementation lives in `infra::kv`.
//!
//! [`CacheStore`] is the fail-open facade read paths and the invalidation
//! bus use: store failures are logged and absorbed so a dead cache tier
//! degrades to pass-through-to-storage, never to a user-visible error.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "fomento_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "fomento_cache_miss_total";
pub(crate) const METRIC_STORE_ERROR: &str = "fomento_cache_store_error_total";

/// Errors surfaced by a key/value store backend.
///
/// These never reach the surrounding application: every consumer in this
/// crate resolves them with a documented fallback (fail-open for rate
/// limiting, pass-through for caching).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store operation timed out")]
    Timeout,
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Minimal atomic key/value surface the core depends on.
///
/// Implementations must make each operation atomic at the store level; the
/// core never wraps them in its own distributed locking.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Delete a key, reporting whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically increment an integer counter, creating it at 1 with the
    /// given expiry when absent. The TTL is only applied on creation so a
    /// fixed window keeps its original deadline.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;
}

// ============================================================================
// MemoryStore: in-process fallback backend
// ============================================================================

#[derive(Clone)]
struct MemoryEntry {
    value: Bytes,
    expires_at: Instant,
}

impl MemoryEntry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// LRU-bounded in-process store with per-entry expiry.
///
/// Counters use the same ASCII-integer representation a Redis `INCR` would,
/// so the two backends are interchangeable behind [`KeyValueStore`].
pub struct MemoryStore {
    entries: RwLock<LruCache<String, MemoryEntry>>,
}

impl MemoryStore {
    /// Create a store bounded to `max_entries` (clamped to at least 1).
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of live entries, counting expired ones not yet collected.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.expired(now) => {
                entries.pop(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let entry = MemoryEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set").put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(rw_write(&self.entries, SOURCE, "delete").pop(key).is_some())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "increment");

        let (count, expires_at) = match entries.get(key) {
            Some(entry) if !entry.expired(now) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .ok_or_else(|| {
                        StoreError::backend(format!("value at `{key}` is not an integer"))
                    })?;
                (current + 1, entry.expires_at)
            }
            _ => (1, now + ttl),
        };

        let entry = MemoryEntry {
            value: Bytes::from(count.to_string()),
            expires_at,
        };
        entries.put(key.to_string(), entry);
        Ok(count)
    }
}

// ============================================================================
// CacheStore: fail-open facade
// ============================================================================

/// Typed, fail-open view over a [`KeyValueStore`].
///
/// Every operation absorbs backend failures: a warning is logged, the error
/// counter is bumped, and the call behaves as a miss (or no-op). Callers
/// therefore never need to branch on cache-tier health.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// The raw backend, for consumers that need error visibility
    /// (the rate limiter applies its own fail-open policy).
    pub fn backend(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.backend)
    }

    /// Fetch and decode a cached value; any failure reads as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw,
            Err(err) => {
                Self::note_unavailable("get", key, &err);
                return None;
            }
        };

        let Some(raw) = raw else {
            counter!(METRIC_CACHE_MISS).increment(1);
            return None;
        };

        match serde_json::from_slice(&raw) {
            Ok(value) => {
                counter!(METRIC_CACHE_HIT).increment(1);
                Some(value)
            }
            Err(err) => {
                // A payload from an incompatible writer; drop it and repopulate.
                warn!(
                    op = "get_json",
                    cache_key = key,
                    error = %err,
                    "Discarding undecodable cache payload"
                );
                let _ = self.backend.delete(key).await;
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Encode and store a value, best-effort.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_vec(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(op = "put_json", cache_key = key, error = %err, "Failed to encode cache payload");
                return;
            }
        };

        if let Err(err) = self.backend.set(key, Bytes::from(raw), ttl).await {
            Self::note_unavailable("set", key, &err);
        }
    }

    /// Delete a key, best-effort. Returns whether the key was present.
    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(existed) => existed,
            Err(err) => {
                Self::note_unavailable("delete", key, &err);
                false
            }
        }
    }

    /// Read an integer counter, treating absence and failure as `None`.
    pub async fn read_counter(&self, key: &str) -> Option<u64> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                Self::note_unavailable("get", key, &err);
                return None;
            }
        };

        std::str::from_utf8(&raw)
            .ok()
            .and_then(|text| text.parse::<u64>().ok())
    }

    /// Atomically bump a counter, best-effort.
    pub async fn bump_counter(&self, key: &str, ttl: Duration) -> Option<u64> {
        match self.backend.increment(key, ttl).await {
            Ok(count) => Some(count),
            Err(err) => {
                Self::note_unavailable("increment", key, &err);
                None
            }
        }
    }

    /// Overwrite a counter with a specific value, best-effort.
    pub async fn put_counter(&self, key: &str, value: u64, ttl: Duration) {
        let raw = Bytes::from(value.to_string());
        if let Err(err) = self.backend.set(key, raw, ttl).await {
            Self::note_unavailable("set", key, &err);
        }
    }

    fn note_unavailable(op: &'static str, key: &str, err: &StoreError) {
        counter!(METRIC_STORE_ERROR).increment(1);
        warn!(
            op,
            cache_key = key,
            error = %err,
            "Cache store unavailable, continuing without it"
        );
    }
}
