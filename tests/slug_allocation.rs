//! Uniqueness-under-concurrency: simultaneous creations with the same title
//! must commit with distinct slugs, with the unique constraint as the only
//! arbiter.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use fomento::application::repos::RepoError;
use fomento::application::slugs::{AllocateError, SlugAllocator};
use fomento::config::SlugSettings;

/// Stand-in for the slug column's unique index: inserts are atomic and
/// first-writer-wins, exactly what the storage layer guarantees.
#[derive(Clone, Default)]
struct UniqueIndex {
    rows: Arc<Mutex<HashSet<String>>>,
}

impl UniqueIndex {
    fn insert(&self, slug: &str) -> Result<String, RepoError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.insert(slug.to_string()) {
            Ok(slug.to_string())
        } else {
            Err(RepoError::Duplicate {
                constraint: "calls_slug_key".to_string(),
            })
        }
    }

    fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

async fn allocate(
    allocator: &SlugAllocator,
    index: &UniqueIndex,
    title: &str,
) -> Result<String, AllocateError> {
    allocator
        .allocate(title, |candidate| {
            let index = index.clone();
            async move {
                // Interleave tasks between candidate generation and commit,
                // the window a pre-check implementation would race in.
                tokio::task::yield_now().await;
                index.insert(&candidate)
            }
        })
        .await
}

#[tokio::test]
async fn two_simultaneous_creations_get_base_and_suffixed_slugs() {
    let index = UniqueIndex::default();
    let allocator = Arc::new(SlugAllocator::new(&SlugSettings::default()));

    let first = {
        let allocator = allocator.clone();
        let index = index.clone();
        tokio::spawn(async move { allocate(&allocator, &index, "Edital 2026").await.unwrap() })
    };
    let second = {
        let allocator = allocator.clone();
        let index = index.clone();
        tokio::spawn(async move { allocate(&allocator, &index, "Edital 2026").await.unwrap() })
    };

    let slugs: HashSet<String> = [first.await.unwrap(), second.await.unwrap()]
        .into_iter()
        .collect();

    assert_eq!(
        slugs,
        HashSet::from(["edital-2026".to_string(), "edital-2026-2".to_string()])
    );
}

#[tokio::test]
async fn a_storm_of_writers_never_duplicates_a_slug() {
    let index = UniqueIndex::default();
    let allocator = Arc::new(SlugAllocator::new(&SlugSettings::default()));
    let titles = ["Edital 2026", "Edital 2026!", "EDITAL  2026", "Café & Co"];

    let mut handles = Vec::new();
    for round in 0..3 {
        for title in titles {
            let allocator = allocator.clone();
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                let slug = allocate(&allocator, &index, title).await.unwrap();
                (round, slug)
            }));
        }
    }

    let mut seen = HashMap::new();
    for handle in handles {
        let (_round, slug) = handle.await.unwrap();
        assert!(
            seen.insert(slug.clone(), ()).is_none(),
            "slug `{slug}` was issued twice"
        );
    }

    // Every writer committed a distinct row.
    assert_eq!(index.len(), 3 * titles.len());
    assert!(seen.contains_key("edital-2026"));
    assert!(seen.contains_key("cafe-co"));
}

#[tokio::test]
async fn exhaustion_surfaces_after_the_configured_bound() {
    let settings = SlugSettings {
        max_length: 64,
        max_attempts: 3,
    };
    let allocator = SlugAllocator::new(&settings);
    let index = UniqueIndex::default();

    for expected in ["edital-2026", "edital-2026-2", "edital-2026-3"] {
        let slug = allocate(&allocator, &index, "Edital 2026").await.unwrap();
        assert_eq!(slug, expected);
    }

    let err = allocate(&allocator, &index, "Edital 2026")
        .await
        .unwrap_err();
    assert!(matches!(err, AllocateError::Exhausted { attempts: 3, .. }));
}
