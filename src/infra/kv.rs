//! Redis-backed key/value store adapter.
//!
//! Every operation runs under the configured timeout (low tens of
//! milliseconds): the store is an auxiliary tier, and a slow store must
//! degrade into the callers' fail-open paths instead of stalling request
//! workers. The connection manager reconnects in the background, so a
//! Redis restart heals without process intervention.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use tokio::time::timeout;
use tracing::info;

use crate::cache::{KeyValueStore, MemoryStore, StoreError};
use crate::config::{CacheBackendSettings, CacheSettings};

use super::error::InfraError;

pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, InfraError> {
        let client = redis::Client::open(url)
            .map_err(|err| InfraError::configuration(format!("invalid redis url: {err}")))?;

        let mut manager = ConnectionManager::new(client)
            .await
            .map_err(|err| InfraError::store(format!("redis connection failed: {err}")))?;

        timeout(
            op_timeout.max(Duration::from_secs(1)),
            redis::cmd("PING").query_async::<()>(&mut manager),
        )
        .await
        .map_err(|_| InfraError::store("redis PING timed out"))?
        .map_err(|err| InfraError::store(format!("redis PING failed: {err}")))?;

        Ok(Self {
            manager,
            op_timeout,
        })
    }

    async fn run<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(StoreError::backend(err.to_string())),
            Err(_elapsed) => Err(StoreError::Timeout),
        }
    }

    fn ttl_seconds(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<Vec<u8>> = self
            .run(redis::cmd("GET").arg(key).query_async(&mut conn))
            .await?;
        Ok(raw.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        self.run(
            redis::cmd("SETEX")
                .arg(key)
                .arg(Self::ttl_seconds(ttl))
                .arg(value.as_ref())
                .query_async::<()>(&mut conn),
        )
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .run(redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.manager.clone();
        let (count,): (i64,) = self
            .run(
                redis::pipe()
                    .atomic()
                    .cmd("INCR")
                    .arg(key)
                    .cmd("EXPIRE")
                    .arg(key)
                    .arg(Self::ttl_seconds(ttl))
                    .ignore()
                    .query_async(&mut conn),
            )
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Build the configured key/value store backend.
pub async fn build_store(settings: &CacheSettings) -> Result<Arc<dyn KeyValueStore>, InfraError> {
    match &settings.backend {
        CacheBackendSettings::Memory { max_entries } => {
            info!(max_entries, "Using in-process key/value store");
            Ok(Arc::new(MemoryStore::new(*max_entries)))
        }
        CacheBackendSettings::Redis { url } => {
            let store = RedisStore::connect(url, settings.op_timeout()).await?;
            info!("Using redis key/value store");
            Ok(Arc::new(store))
        }
    }
}
