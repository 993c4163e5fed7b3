//! Fail-open request admission control.
//!
//! Fixed-window counting: each call atomically increments a counter keyed
//! by `(identity, window start)` in the shared store and compares the result
//! against the limit. Fixed windows admit up to twice the limit across a
//! window boundary; that is an accepted trade-off over sliding-window
//! precision, keeping every decision a single O(1) store operation.
//!
//! A down or slow store degrades to "allow all", never "reject all": the
//! guard logs the failure, bumps a metric, and admits the request. The
//! guard is also bypassable wholesale through configuration for automated
//! test environments.
//!
//! This is an explicit guard, not middleware: callers check the returned
//! decision and produce their own "too many requests" response.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::cache::KeyValueStore;
use crate::config::{RateLimitRule, RateLimitSettings};

const KEY_NAMESPACE: &str = "fomento:ratelimit";

pub(crate) const METRIC_DENIED: &str = "fomento_rate_limit_denied_total";
pub(crate) const METRIC_FAIL_OPEN: &str = "fomento_rate_limit_fail_open_total";

/// Route classes with separately configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Mutating handlers (create/update/delete).
    Write,
    /// Read handlers expensive enough to protect (exports, search).
    Sensitive,
}

/// Invalid-input failures, rejected before any store interaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit identity must not be empty")]
    EmptyIdentity,
    #[error("rate limit window must be at least one second")]
    ZeroWindow,
}

/// Outcome of an admission check, with the fields callers need for
/// informational response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    /// Requests counted in the current window, including this one.
    pub current: u64,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_in: Duration,
}

pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: RateLimitSettings) -> Self {
        Self { store, settings }
    }

    /// Check a pre-configured route class for `identity`.
    pub async fn allow_class(
        &self,
        identity: &str,
        class: RouteClass,
    ) -> Result<RateLimitDecision, RateLimitError> {
        let rule = self.rule_for(class);
        self.allow(
            identity,
            rule.max_requests,
            Duration::from_secs(rule.window_seconds),
        )
        .await
    }

    /// Admit or reject one request for `identity` under an explicit limit.
    ///
    /// Never blocks on an unhealthy store beyond the backend's own bounded
    /// timeout, and never surfaces store failures to the caller.
    pub async fn allow(
        &self,
        identity: &str,
        limit: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, RateLimitError> {
        if identity.trim().is_empty() {
            return Err(RateLimitError::EmptyIdentity);
        }
        let window_seconds = window.as_secs();
        if window_seconds == 0 {
            return Err(RateLimitError::ZeroWindow);
        }

        if self.settings.bypass {
            return Ok(RateLimitDecision {
                allowed: true,
                limit,
                current: 0,
                remaining: limit,
                reset_in: window,
            });
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let window_start = window_start(now, window_seconds);
        let reset_in = Duration::from_secs(window_seconds - (now - window_start) as u64);
        let key = format!("{KEY_NAMESPACE}:{identity}:{window_start}");

        let current = match self.store.increment(&key, window).await {
            Ok(count) => count,
            Err(err) => {
                counter!(METRIC_FAIL_OPEN).increment(1);
                warn!(
                    identity,
                    error = %err,
                    "Rate limit store unavailable, admitting request"
                );
                return Ok(RateLimitDecision {
                    allowed: true,
                    limit,
                    current: 0,
                    remaining: limit,
                    reset_in,
                });
            }
        };

        let allowed = current <= u64::from(limit);
        if !allowed {
            counter!(METRIC_DENIED).increment(1);
            debug!(
                identity,
                current,
                limit,
                reset_in_seconds = reset_in.as_secs(),
                "Request rejected by rate limit"
            );
        }

        Ok(RateLimitDecision {
            allowed,
            limit,
            current,
            remaining: limit.saturating_sub(current.min(u64::from(u32::MAX)) as u32),
            reset_in,
        })
    }

    fn rule_for(&self, class: RouteClass) -> &RateLimitRule {
        match class {
            RouteClass::Write => &self.settings.write,
            RouteClass::Sensitive => &self.settings.sensitive,
        }
    }
}

/// Start of the fixed window containing `now`.
fn window_start(now: i64, window_seconds: u64) -> i64 {
    now - now.rem_euclid(window_seconds as i64)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::cache::{MemoryStore, StoreError};

    use super::*;

    const WINDOW: Duration = Duration::from_secs(3600);

    struct UnreachableStore;

    #[async_trait]
    impl KeyValueStore for UnreachableStore {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
            Err(StoreError::Timeout)
        }

        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Timeout)
        }

        async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Timeout)
        }

        async fn increment(&self, _key: &str, _ttl: Duration) -> Result<u64, StoreError> {
            Err(StoreError::backend("connection refused"))
        }
    }

    fn limiter(store: Arc<dyn KeyValueStore>) -> RateLimiter {
        RateLimiter::new(store, RateLimitSettings::default())
    }

    #[tokio::test]
    async fn requests_over_the_limit_are_denied() {
        let limiter = limiter(Arc::new(MemoryStore::new(64)));

        for attempt in 1..=3u64 {
            let decision = limiter.allow("10.0.0.1:write", 3, WINDOW).await.unwrap();
            assert!(decision.allowed, "request {attempt} should be admitted");
            assert_eq!(decision.current, attempt);
        }

        let denied = limiter.allow("10.0.0.1:write", 3, WINDOW).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.current, 4);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn identities_are_counted_separately() {
        let limiter = limiter(Arc::new(MemoryStore::new(64)));

        let first = limiter.allow("10.0.0.1:write", 1, WINDOW).await.unwrap();
        let other = limiter.allow("10.0.0.2:write", 1, WINDOW).await.unwrap();

        assert!(first.allowed);
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn unreachable_store_fails_open() {
        let limiter = limiter(Arc::new(UnreachableStore));

        for _ in 0..50 {
            let decision = limiter.allow("10.0.0.1:write", 1, WINDOW).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.current, 0);
        }
    }

    #[tokio::test]
    async fn bypass_flag_skips_the_store_entirely() {
        let settings = RateLimitSettings {
            bypass: true,
            ..Default::default()
        };
        // An unreachable store proves no store traffic happens.
        let limiter = RateLimiter::new(Arc::new(UnreachableStore), settings);

        let decision = limiter.allow("anyone", 1, WINDOW).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_store_access() {
        let limiter = limiter(Arc::new(UnreachableStore));

        assert_eq!(
            limiter.allow("  ", 1, WINDOW).await.unwrap_err(),
            RateLimitError::EmptyIdentity
        );
        assert_eq!(
            limiter.allow("10.0.0.1", 1, Duration::ZERO).await.unwrap_err(),
            RateLimitError::ZeroWindow
        );
    }

    #[tokio::test]
    async fn route_classes_use_configured_thresholds() {
        let settings = RateLimitSettings {
            write: RateLimitRule {
                max_requests: 1,
                window_seconds: 3600,
            },
            ..Default::default()
        };
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new(64)), settings);

        let first = limiter
            .allow_class("10.0.0.1", RouteClass::Write)
            .await
            .unwrap();
        let second = limiter
            .allow_class("10.0.0.1", RouteClass::Write)
            .await
            .unwrap();

        assert!(first.allowed);
        assert!(!second.allowed);
    }

    #[test]
    fn window_start_is_aligned_and_stable_within_a_window() {
        assert_eq!(window_start(0, 60), 0);
        assert_eq!(window_start(59, 60), 0);
        assert_eq!(window_start(60, 60), 60);
        assert_eq!(window_start(61, 60), 60);
        // Pre-epoch timestamps still round toward the window floor.
        assert_eq!(window_start(-1, 60), -60);
    }
}
