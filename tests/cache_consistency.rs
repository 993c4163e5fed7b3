//! End-to-end cache consistency: after the invalidation bus processes a
//! mutation, no read can observe a value cached before that mutation.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use fomento::cache::{CacheConfig, CacheInvalidationBus, CacheKeyRegistry, CacheStore, MemoryStore};
use fomento::domain::entities::CallRecord;
use fomento::domain::types::{CallStatus, EntityKind};

const TTL: Duration = Duration::from_secs(300);

fn sample_call(id: Uuid, slug: &str, title: &str) -> CallRecord {
    let now = time::OffsetDateTime::now_utc();
    CallRecord {
        id,
        slug: slug.to_string(),
        title: title.to_string(),
        summary: String::new(),
        body_markdown: String::new(),
        status: CallStatus::Open,
        opens_at: None,
        closes_at: None,
        published_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

fn wiring() -> (CacheStore, Arc<CacheKeyRegistry>, CacheInvalidationBus) {
    let store = CacheStore::new(Arc::new(MemoryStore::new(256)));
    let registry = Arc::new(CacheKeyRegistry::new(CacheConfig::default(), store.clone()));
    let bus = CacheInvalidationBus::new(registry.clone());
    (store, registry, bus)
}

#[tokio::test]
async fn detail_reads_never_see_pre_mutation_values() {
    let (store, registry, bus) = wiring();
    let id = Uuid::new_v4();

    // A read path populates the detail cache.
    let key = registry.detail_key(EntityKind::Call, id).unwrap();
    store
        .put_json(&key, &sample_call(id, "edital-2026", "Edital 2026"), TTL)
        .await;
    assert!(store.get_json::<CallRecord>(&key).await.is_some());

    // The write commits, then its post-commit hook reports the mutation.
    bus.on_entity_saved(EntityKind::Call, id).await;

    // The stale payload is gone; the next read recomputes and repopulates.
    let key_after = registry.detail_key(EntityKind::Call, id).unwrap();
    assert_eq!(key, key_after);
    assert!(store.get_json::<CallRecord>(&key_after).await.is_none());
}

#[tokio::test]
async fn listing_reads_move_to_a_fresh_key_after_mutation() {
    let (store, registry, bus) = wiring();

    let filters = [("status", "open")];
    let listing_key = registry
        .listing_key(EntityKind::Call, &filters)
        .await
        .unwrap();
    store
        .put_json(&listing_key, &vec!["edital-2026".to_string()], TTL)
        .await;

    bus.on_entity_saved(EntityKind::Call, Uuid::new_v4()).await;

    // Every filter combination is stranded at once: the registry now
    // renders a different key, so the stale entry is unreachable.
    let fresh_key = registry
        .listing_key(EntityKind::Call, &filters)
        .await
        .unwrap();
    assert_ne!(listing_key, fresh_key);
    assert!(store.get_json::<Vec<String>>(&fresh_key).await.is_none());
}

#[tokio::test]
async fn deletes_invalidate_like_saves() {
    let (store, registry, bus) = wiring();
    let id = Uuid::new_v4();

    let key = registry.detail_key(EntityKind::Startup, id).unwrap();
    store.put_json(&key, &"cached detail", TTL).await;

    bus.on_entity_deleted(EntityKind::Startup, id).await;

    assert!(store.get_json::<String>(&key).await.is_none());
}

#[tokio::test]
async fn clear_all_strands_details_and_listings_everywhere() {
    let (store, registry, bus) = wiring();
    let id = Uuid::new_v4();

    let detail = registry.detail_key(EntityKind::Call, id).unwrap();
    let listing = registry.listing_key(EntityKind::Startup, &[]).await.unwrap();
    store.put_json(&detail, &"detail", TTL).await;
    store.put_json(&listing, &"listing", TTL).await;

    bus.clear_all().await;

    let detail_after = registry.detail_key(EntityKind::Call, id).unwrap();
    let listing_after = registry.listing_key(EntityKind::Startup, &[]).await.unwrap();
    assert_ne!(detail, detail_after);
    assert_ne!(listing, listing_after);
    assert!(store.get_json::<String>(&detail_after).await.is_none());
    assert!(store.get_json::<String>(&listing_after).await.is_none());
}

#[tokio::test]
async fn equal_filter_sets_share_one_cache_entry_regardless_of_order() {
    let (store, registry, _bus) = wiring();

    let forward = registry
        .listing_key(EntityKind::Call, &[("status", "open"), ("q", "agro")])
        .await
        .unwrap();
    let reverse = registry
        .listing_key(EntityKind::Call, &[("q", "agro"), ("status", "open")])
        .await
        .unwrap();

    assert_eq!(forward, reverse);

    store.put_json(&forward, &vec![1u32, 2, 3], TTL).await;
    assert_eq!(
        store.get_json::<Vec<u32>>(&reverse).await,
        Some(vec![1, 2, 3])
    );
}

#[tokio::test]
async fn restarted_process_adopts_a_persisted_generation() {
    let backend = Arc::new(MemoryStore::new(256));

    // First process wipes the cache administratively.
    let store = CacheStore::new(backend.clone());
    let registry = Arc::new(CacheKeyRegistry::new(CacheConfig::default(), store.clone()));
    let bus = CacheInvalidationBus::new(registry.clone());
    bus.clear_all().await;
    let stranded_prefix = registry.global_prefix();

    // Second process against the same store picks the generation up.
    let registry_two = CacheKeyRegistry::new(CacheConfig::default(), CacheStore::new(backend));
    registry_two.adopt_generation().await;

    assert_eq!(registry_two.global_prefix(), stranded_prefix);
}
