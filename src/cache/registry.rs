//! Versioned cache key registry.
//!
//! The registry layers three pieces of state onto the pure renderer in
//! [`super::keys`]:
//!
//! - the configured **key prefix** and **format version**, so a config bump
//!   strands every previously written key without touching the store;
//! - an in-process **generation** counter, bumped by
//!   [`super::bus::CacheInvalidationBus::clear_all`] for lazy O(1) wipes;
//! - the per-entity-type **listing epoch**, read from the shared store and
//!   embedded into every listing key, so one atomic increment invalidates
//!   every filter combination at once.
//!
//! Detail keys deliberately embed no epoch: they are few and enumerable, so
//! the bus deletes them directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uuid::Uuid;

use crate::domain::types::EntityKind;

use super::config::CacheConfig;
use super::keys::{EPOCH_PARAM, KeyError, reject_reserved, render_key};
use super::store::CacheStore;

pub struct CacheKeyRegistry {
    config: CacheConfig,
    generation: AtomicU64,
    store: CacheStore,
}

impl CacheKeyRegistry {
    pub fn new(config: CacheConfig, store: CacheStore) -> Self {
        Self {
            config,
            generation: AtomicU64::new(0),
            store,
        }
    }

    /// The prefix every key rendered by this registry starts with.
    ///
    /// Both the configured version and the runtime generation are part of
    /// it, so bumping either makes all previously rendered keys unreachable.
    pub fn global_prefix(&self) -> String {
        format!(
            "{}-v{}.{}",
            self.config.key_prefix,
            self.config.version,
            self.generation.load(Ordering::Acquire)
        )
    }

    /// Build a key for an arbitrary logical namespace under this registry's
    /// versioned prefix. Reserved parameter names are rejected.
    pub fn build_key(&self, logical: &str, params: &[(&str, &str)]) -> Result<String, KeyError> {
        reject_reserved(params)?;
        render_key(&self.global_prefix(), logical, params)
    }

    /// Key caching a single entity's detail payload.
    pub fn detail_key(&self, kind: EntityKind, id: Uuid) -> Result<String, KeyError> {
        let id = id.to_string();
        render_key(
            &self.global_prefix(),
            &format!("{kind}-detail"),
            &[("id", id.as_str())],
        )
    }

    /// Key caching a listing for the given filter set.
    ///
    /// The current listing epoch is folded in as a reserved parameter;
    /// listing keys are intentionally not enumerable, so invalidation bumps
    /// the epoch instead of deleting them.
    pub async fn listing_key(
        &self,
        kind: EntityKind,
        filters: &[(&str, &str)],
    ) -> Result<String, KeyError> {
        reject_reserved(filters)?;

        let epoch = self.listing_epoch(kind).await.to_string();
        let mut params: Vec<(&str, &str)> = Vec::with_capacity(filters.len() + 1);
        params.extend_from_slice(filters);
        params.push((EPOCH_PARAM, epoch.as_str()));

        render_key(&self.global_prefix(), &format!("{kind}-listing"), &params)
    }

    /// Current listing epoch for an entity kind; absence or store failure
    /// reads as epoch 0.
    pub async fn listing_epoch(&self, kind: EntityKind) -> u64 {
        if !self.config.enabled {
            return 0;
        }
        self.store
            .read_counter(&self.epoch_store_key(kind))
            .await
            .unwrap_or(0)
    }

    /// Store key holding the listing epoch counter for `kind`.
    ///
    /// Epochs live outside the generation so a `clear_all` does not orphan
    /// them; the generation change alone already strands every cached value.
    pub(crate) fn epoch_store_key(&self, kind: EntityKind) -> String {
        format!(
            "{}-v{}:epoch:{kind}",
            self.config.key_prefix, self.config.version
        )
    }

    /// Store key persisting the generation across process restarts.
    pub(crate) fn generation_store_key(&self) -> String {
        format!(
            "{}-v{}:generation",
            self.config.key_prefix, self.config.version
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Adopt a generation previously persisted by another process, keeping
    /// whichever is larger. Called once at startup by the host application.
    pub async fn adopt_generation(&self) {
        if let Some(persisted) = self.store.read_counter(&self.generation_store_key()).await {
            self.generation.fetch_max(persisted, Ordering::AcqRel);
        }
    }

    pub(crate) fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub(crate) fn epoch_ttl(&self) -> Duration {
        self.config.epoch_ttl()
    }

    pub(crate) fn store(&self) -> &CacheStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::store::MemoryStore;
    use super::*;

    fn registry() -> CacheKeyRegistry {
        let store = CacheStore::new(Arc::new(MemoryStore::new(64)));
        CacheKeyRegistry::new(CacheConfig::default(), store)
    }

    #[test]
    fn detail_key_is_stable() {
        let registry = registry();
        let id = Uuid::nil();

        let first = registry.detail_key(EntityKind::Call, id).unwrap();
        let second = registry.detail_key(EntityKind::Call, id).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            format!("fomento-v1.0_call-detail:id={id}")
        );
    }

    #[tokio::test]
    async fn listing_key_embeds_epoch() {
        let registry = registry();

        let key = registry
            .listing_key(EntityKind::Call, &[("status", "open")])
            .await
            .unwrap();
        assert_eq!(key, "fomento-v1.0_call-listing:epoch=0,status=open");

        registry
            .store()
            .bump_counter(
                &registry.epoch_store_key(EntityKind::Call),
                Duration::from_secs(60),
            )
            .await;

        let bumped = registry
            .listing_key(EntityKind::Call, &[("status", "open")])
            .await
            .unwrap();
        assert_eq!(bumped, "fomento-v1.0_call-listing:epoch=1,status=open");
    }

    #[tokio::test]
    async fn epochs_are_scoped_per_entity_kind() {
        let registry = registry();

        registry
            .store()
            .bump_counter(
                &registry.epoch_store_key(EntityKind::Call),
                Duration::from_secs(60),
            )
            .await;

        assert_eq!(registry.listing_epoch(EntityKind::Call).await, 1);
        assert_eq!(registry.listing_epoch(EntityKind::Startup).await, 0);
    }

    #[tokio::test]
    async fn caller_cannot_shadow_the_epoch_parameter() {
        let registry = registry();

        let err = registry
            .listing_key(EntityKind::Call, &[("epoch", "999")])
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::ReservedParameter { .. }));
    }

    #[test]
    fn generation_bump_changes_every_key() {
        let registry = registry();
        let id = Uuid::nil();

        let before = registry.detail_key(EntityKind::Startup, id).unwrap();
        registry.bump_generation();
        let after = registry.detail_key(EntityKind::Startup, id).unwrap();

        assert_ne!(before, after);
        assert!(after.starts_with("fomento-v1.1_"));
    }

    #[tokio::test]
    async fn adopt_generation_takes_the_larger_value() {
        let registry = registry();

        registry
            .store()
            .put_counter(&registry.generation_store_key(), 5, Duration::from_secs(60))
            .await;

        registry.adopt_generation().await;
        assert_eq!(registry.generation(), 5);

        // A smaller persisted value never rolls the generation back.
        registry
            .store()
            .put_counter(&registry.generation_store_key(), 2, Duration::from_secs(60))
            .await;
        registry.adopt_generation().await;
        assert_eq!(registry.generation(), 5);
    }
}
