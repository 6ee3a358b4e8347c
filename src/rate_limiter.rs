//! # Per-User Rate Limiting
//!
//! Fixed-window counter over the shared store: `INCR rate_limit:{user}`, arm
//! the expiry when the counter is fresh or has lost its expiry, reject once
//! the count passes the configured maximum.
//!
//! When the store cannot be reached the limiter lets the request through and
//! logs a warning. Keeping the bot usable matters more than strict throttling.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::errors::{error_logging, AppResult};
use crate::store::{keys, KeyValueStore};

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Within budget; carries the post-increment count
    Allowed(i64),
    /// Over budget; carries the post-increment count
    Rejected(i64),
    /// Store unavailable, request let through
    FailedOpen,
}

impl RateDecision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, RateDecision::Rejected(_))
    }

    fn label(self) -> &'static str {
        match self {
            RateDecision::Allowed(_) => "allowed",
            RateDecision::Rejected(_) => "rejected",
            RateDecision::FailedOpen => "fail_open",
        }
    }
}

/// Fixed-window rate limiter keyed by Telegram user id.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    window: Duration,
    max_requests: i64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, window: Duration, max_requests: u64) -> Self {
        Self {
            store,
            window,
            max_requests: i64::try_from(max_requests).unwrap_or(i64::MAX),
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &RateLimitConfig) -> Self {
        Self::new(
            store,
            Duration::from_secs(config.window_secs),
            config.max_requests,
        )
    }

    /// `true` when the user may proceed.
    pub async fn allow(&self, user_id: i64) -> bool {
        self.check(user_id).await.is_allowed()
    }

    /// Count this request against the user's window and report the decision.
    pub async fn check(&self, user_id: i64) -> RateDecision {
        let decision = match self.count_request(user_id).await {
            Ok(count) if count > self.max_requests => {
                warn!(
                    user_id = %user_id,
                    count = %count,
                    max_requests = %self.max_requests,
                    "Rate limit exceeded"
                );
                RateDecision::Rejected(count)
            }
            Ok(count) => {
                debug!(user_id = %user_id, count = %count, "Request within rate limit");
                RateDecision::Allowed(count)
            }
            Err(e) => {
                error_logging::log_store_error(&e, "rate_limit", &keys::rate_limit(user_id));
                warn!(user_id = %user_id, "Rate limiter store unavailable, allowing request");
                RateDecision::FailedOpen
            }
        };

        metrics::counter!("rate_limit_decisions_total", "decision" => decision.label())
            .increment(1);
        decision
    }

    async fn count_request(&self, user_id: i64) -> AppResult<i64> {
        let key = keys::rate_limit(user_id);
        let count = self.store.incr(&key).await?;
        // A counter without a TTL would never reset; re-arm it
        if count == 1 || self.store.ttl(&key).await? == -1 {
            self.store.expire(&key, self.window).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(window: Duration, max: u64) -> (RateLimiter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (RateLimiter::new(store.clone(), window, max), store)
    }

    #[tokio::test]
    async fn test_requests_within_budget_are_allowed() {
        let (limiter, _) = limiter(Duration::from_secs(10), 5);
        for n in 1..=5 {
            assert_eq!(limiter.check(42).await, RateDecision::Allowed(n));
        }
    }

    #[tokio::test]
    async fn test_request_over_budget_is_rejected() {
        let (limiter, _) = limiter(Duration::from_secs(10), 5);
        for _ in 0..5 {
            assert!(limiter.allow(42).await);
        }
        assert!(!limiter.allow(42).await);
        assert_eq!(limiter.check(42).await, RateDecision::Rejected(7));
    }

    #[tokio::test]
    async fn test_users_have_independent_windows() {
        let (limiter, _) = limiter(Duration::from_secs(10), 1);
        assert!(limiter.allow(1).await);
        assert!(!limiter.allow(1).await);
        assert!(limiter.allow(2).await);
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let (limiter, store) = limiter(Duration::from_millis(50), 2);
        assert!(limiter.allow(9).await);
        assert!(limiter.allow(9).await);
        assert!(!limiter.allow(9).await);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(limiter.check(9).await, RateDecision::Allowed(1));
        assert_eq!(store.get("rate_limit:9").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_counter_without_expiry_is_rearmed() {
        let (limiter, store) = limiter(Duration::from_secs(10), 5);
        // Left behind by an earlier run whose EXPIRE never landed
        store.incr("rate_limit:7").await.unwrap();
        assert_eq!(store.ttl("rate_limit:7").await.unwrap(), -1);

        assert_eq!(limiter.check(7).await, RateDecision::Allowed(2));
        assert!(store.ttl("rate_limit:7").await.unwrap() > 0);
    }
}
