//! Fomento infrastructure core.
//!
//! This crate is the infrastructure layer underneath a funding-call and
//! incubation-portfolio platform. It owns the four mechanisms with real
//! correctness hazards and nothing else:
//!
//! - **Cache keys and invalidation** (`cache`): versioned, namespaced cache
//!   keys, epoch-based listing invalidation, and a best-effort invalidation
//!   bus driven from post-commit hooks.
//! - **Rate limiting** (`ratelimit`): fixed-window counting in a shared
//!   store that degrades to "allow all" when the store is unreachable.
//! - **Slug allocation** (`application::slugs`): commit-and-retry unique
//!   slug allocation with the database's unique constraint as the single
//!   source of truth.
//! - **Search** (`application::search`): ranked full-text queries with a
//!   substring fallback selected once from the backend capability flag.
//!
//! Rendering, forms, admin screens, and authentication live in the
//! surrounding application, which calls into this crate through the traits
//! in `application::repos` and the types re-exported below.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod ratelimit;

pub use application::search::{SearchEngine, SearchFilter, SearchHit, SearchMode};
pub use application::slugs::SlugAllocator;
pub use cache::{CacheInvalidationBus, CacheKeyRegistry, CacheStore, KeyValueStore, MemoryStore};
pub use config::Settings;
pub use ratelimit::{RateLimitDecision, RateLimiter, RouteClass};
