//! Unique slug allocation under concurrent writers.
//!
//! Pre-checking "does this slug exist" before insert is racy: two writers
//! can both pass the check and then collide at commit. The allocator
//! instead treats the database's unique constraint as the single source of
//! truth: it attempts the insert, and on a uniqueness conflict retries with
//! `-2`, `-3`, … suffixes. Conflicts are rare and retries cheap, so retry
//! is immediate, bounded by a hard cap.
//!
//! The commit closure performs the actual persistence attempt and binds the
//! entity type; callers must keep the surrounding write idempotent so a
//! retried attempt has no side effects beyond the insert itself.

use std::future::Future;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::repos::RepoError;
use crate::config::SlugSettings;
use crate::domain::slug::{SlugError, derive_slug, truncate_for_suffix};

pub(crate) const METRIC_SLUG_CONFLICT: &str = "fomento_slug_conflict_total";

/// Failures surfaced by slug allocation.
///
/// `Exhausted` is the permanent allocation failure of the retry bound being
/// exceeded, distinct from a generic repository failure.
#[derive(Debug, Error)]
pub enum AllocateError {
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("exhausted {attempts} attempts to find a unique slug for `{base}`")]
    Exhausted { base: String, attempts: u32 },
    #[error(transparent)]
    Repo(RepoError),
}

pub struct SlugAllocator {
    max_length: usize,
    max_attempts: u32,
}

impl SlugAllocator {
    pub fn new(settings: &SlugSettings) -> Self {
        Self {
            max_length: settings.max_length,
            max_attempts: settings.max_attempts.max(1),
        }
    }

    /// Normalize `base` and commit the entity under the first free slug.
    ///
    /// `commit` receives each candidate slug in turn and must attempt the
    /// durable insert; returning [`RepoError::Duplicate`] triggers the next
    /// candidate, any other error aborts the allocation.
    pub async fn allocate<T, F, Fut>(&self, base: &str, mut commit: F) -> Result<T, AllocateError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let derived = derive_slug(base)?;
        let trimmed = truncate_for_suffix(&derived, self.max_length, self.suffix_reserve());

        for attempt in 1..=self.max_attempts {
            let candidate = if attempt == 1 {
                trimmed.clone()
            } else {
                format!("{trimmed}-{attempt}")
            };

            match commit(candidate.clone()).await {
                Ok(value) => {
                    debug!(slug = candidate, attempt, "Slug allocated");
                    return Ok(value);
                }
                Err(err) if err.is_duplicate() => {
                    counter!(METRIC_SLUG_CONFLICT).increment(1);
                    debug!(
                        slug = candidate,
                        attempt, "Slug already taken, retrying with suffix"
                    );
                }
                Err(err) => return Err(AllocateError::Repo(err)),
            }
        }

        warn!(
            base = trimmed,
            attempts = self.max_attempts,
            "Slug allocation exhausted its retry bound"
        );
        Err(AllocateError::Exhausted {
            base: trimmed,
            attempts: self.max_attempts,
        })
    }

    /// Characters reserved for the widest suffix this allocator can emit.
    fn suffix_reserve(&self) -> usize {
        let digits = (self.max_attempts.max(2)).ilog10() as usize + 1;
        digits + 1
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use super::*;

    fn allocator() -> SlugAllocator {
        SlugAllocator::new(&SlugSettings::default())
    }

    /// Simulates the unique index: an insert wins only if the slug is new.
    #[derive(Clone, Default)]
    struct FakeTable {
        slugs: Arc<Mutex<HashSet<String>>>,
    }

    impl FakeTable {
        fn insert(&self, slug: &str) -> Result<String, RepoError> {
            let mut slugs = self.slugs.lock().unwrap();
            if slugs.insert(slug.to_string()) {
                Ok(slug.to_string())
            } else {
                Err(RepoError::Duplicate {
                    constraint: "calls_slug_key".to_string(),
                })
            }
        }
    }

    #[tokio::test]
    async fn first_attempt_wins_without_conflict() {
        let table = FakeTable::default();
        let slug = allocator()
            .allocate("Edital 2026", |candidate| {
                let table = table.clone();
                async move { table.insert(&candidate) }
            })
            .await
            .unwrap();

        assert_eq!(slug, "edital-2026");
    }

    #[tokio::test]
    async fn conflicts_append_numeric_suffixes() {
        let table = FakeTable::default();
        table.insert("edital-2026").unwrap();

        let slug = allocator()
            .allocate("Edital 2026", |candidate| {
                let table = table.clone();
                async move { table.insert(&candidate) }
            })
            .await
            .unwrap();
        assert_eq!(slug, "edital-2026-2");

        let third = allocator()
            .allocate("Edital 2026", |candidate| {
                let table = table.clone();
                async move { table.insert(&candidate) }
            })
            .await
            .unwrap();
        assert_eq!(third, "edital-2026-3");
    }

    #[tokio::test]
    async fn accents_and_symbols_normalize() {
        let table = FakeTable::default();
        let slug = allocator()
            .allocate("Café & Co", |candidate| {
                let table = table.clone();
                async move { table.insert(&candidate) }
            })
            .await
            .unwrap();

        assert_eq!(slug, "cafe-co");
    }

    #[tokio::test]
    async fn concurrent_allocations_never_share_a_slug() {
        let table = FakeTable::default();
        let allocator = Arc::new(allocator());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator
                    .allocate("Edital 2026", move |candidate| {
                        let table = table.clone();
                        async move {
                            // Yield between candidate generation and commit so
                            // tasks interleave aggressively.
                            tokio::task::yield_now().await;
                            table.insert(&candidate)
                        }
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut allocated = HashSet::new();
        for handle in handles {
            let slug = handle.await.unwrap();
            assert!(allocated.insert(slug.clone()), "slug `{slug}` issued twice");
        }

        assert!(allocated.contains("edital-2026"));
        assert!(allocated.contains("edital-2026-2"));
    }

    #[tokio::test]
    async fn exhaustion_is_a_distinct_permanent_failure() {
        let err = allocator()
            .allocate("Edital 2026", |_candidate| async {
                Err::<(), _>(RepoError::Duplicate {
                    constraint: "calls_slug_key".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AllocateError::Exhausted { attempts: 10, .. }
        ));
    }

    #[tokio::test]
    async fn non_duplicate_errors_abort_immediately() {
        let mut attempts = 0u32;
        let err = allocator()
            .allocate("Edital 2026", |_candidate| {
                attempts += 1;
                async { Err::<(), _>(RepoError::Timeout) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AllocateError::Repo(RepoError::Timeout)));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn empty_titles_are_rejected_before_any_write() {
        let err = allocator()
            .allocate::<(), _, _>("   ", |_candidate| async {
                panic!("commit must not run for invalid input")
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AllocateError::Slug(SlugError::EmptyInput)));
    }

    #[tokio::test]
    async fn long_titles_leave_room_for_suffixes() {
        let settings = SlugSettings {
            max_length: 20,
            max_attempts: 10,
        };
        let allocator = SlugAllocator::new(&settings);
        let table = FakeTable::default();

        let title = "Programa Nacional de Aceleração de Startups";
        let first = allocator
            .allocate(title, |candidate| {
                let table = table.clone();
                async move { table.insert(&candidate) }
            })
            .await
            .unwrap();
        let second = allocator
            .allocate(title, |candidate| {
                let table = table.clone();
                async move { table.insert(&candidate) }
            })
            .await
            .unwrap();

        assert!(first.len() <= 20);
        assert!(second.len() <= 20);
        assert_eq!(second, format!("{first}-2"));
    }
}
