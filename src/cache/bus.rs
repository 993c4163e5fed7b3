//! Entity-mutation driven cache invalidation.
//!
//! The bus guarantees that once a mutation's effects are externally
//! observable, no stale cached value for that entity is served: the detail
//! key is deleted and the listing epoch is bumped, which strands every
//! listing key for that entity kind at once.
//!
//! Every operation is best-effort. The triggering write has already
//! committed in durable storage by the time the bus runs, so a cache-tier
//! failure must never fail the mutation: the bus logs at warn and returns.
//!
//! **Ordering contract**: invoke these methods from a post-commit hook,
//! after the durable write is visible. Calling them before commit opens a
//! race where a concurrent reader repopulates the cache with pre-mutation
//! data.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::types::EntityKind;

use super::registry::CacheKeyRegistry;

pub(crate) const METRIC_INVALIDATION: &str = "fomento_cache_invalidation_total";

pub struct CacheInvalidationBus {
    registry: Arc<CacheKeyRegistry>,
}

impl CacheInvalidationBus {
    pub fn new(registry: Arc<CacheKeyRegistry>) -> Self {
        Self { registry }
    }

    /// Invalidate everything affected by a created or updated entity.
    ///
    /// Must run post-commit; see the module contract.
    #[instrument(skip(self))]
    pub async fn on_entity_saved(&self, kind: EntityKind, id: Uuid) {
        self.invalidate(kind, id, "saved").await;
    }

    /// Invalidate everything affected by a deleted entity.
    ///
    /// Must run post-commit; see the module contract.
    #[instrument(skip(self))]
    pub async fn on_entity_deleted(&self, kind: EntityKind, id: Uuid) {
        self.invalidate(kind, id, "deleted").await;
    }

    async fn invalidate(&self, kind: EntityKind, id: Uuid, cause: &'static str) {
        if !self.registry.config().enabled {
            debug!(entity_kind = %kind, entity_id = %id, "Cache disabled, invalidation skipped");
            return;
        }

        counter!(METRIC_INVALIDATION).increment(1);

        match self.registry.detail_key(kind, id) {
            Ok(key) => {
                let existed = self.registry.store().delete(&key).await;
                debug!(
                    entity_kind = %kind,
                    entity_id = %id,
                    cache_key = key,
                    existed,
                    cause,
                    "Detail cache entry invalidated"
                );
            }
            Err(err) => {
                // Unreachable with well-formed configuration; never worth
                // failing the surrounding write over.
                warn!(entity_kind = %kind, entity_id = %id, error = %err, "Could not render detail key");
            }
        }

        let epoch_key = self.registry.epoch_store_key(kind);
        let epoch = self
            .registry
            .store()
            .bump_counter(&epoch_key, self.registry.epoch_ttl())
            .await;
        debug!(
            entity_kind = %kind,
            entity_id = %id,
            listing_epoch = epoch,
            cause,
            "Listing epoch bumped"
        );
    }

    /// Administrative wipe of every cache key under the current version.
    ///
    /// Bumps the registry generation, which lazily strands all previously
    /// rendered keys without iterating the store; the new generation is
    /// persisted best-effort so processes started later adopt it.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) {
        let generation = self.registry.bump_generation();
        self.registry
            .store()
            .put_counter(
                &self.registry.generation_store_key(),
                generation,
                self.registry.epoch_ttl(),
            )
            .await;
        debug!(generation, "Cache generation bumped, all keys stranded");
    }
}
