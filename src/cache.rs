//! Shipment read-through cache and its invalidation discipline
//!
//! Shipment details are cached in the shared store under
//! `shipment:{tracking_number}` as JSON, together with the simulation state the
//! web app keeps beside the row (paused flag, speed multiplier). Reads fill the
//! cache on a miss; every mutation deletes the entry before it is reported as
//! done, so the next read sees the new state.
//!
//! Both halves are best effort. A store failure during a read is treated as a
//! miss, a failure during a write or invalidation is logged and swallowed.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shipment_admin_bot::cache::CacheInvalidator;
//! use shipment_admin_bot::store::MemoryStore;
//!
//! # async fn example() {
//! let invalidator = CacheInvalidator::new(Arc::new(MemoryStore::new()));
//! invalidator.invalidate("TRK20240101120000ABC123").await;
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::Shipment;
use crate::errors::error_logging;
use crate::store::{keys, KeyValueStore};

/// How long a cached shipment lives without being invalidated
pub const SHIPMENT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// A shipment row plus its simulation state, as cached and as rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentDetails {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub paused: bool,
    pub speed_multiplier: f64,
}

impl ShipmentDetails {
    pub fn tracking_number(&self) -> &str {
        &self.shipment.tracking_number
    }

    pub fn is_completed(&self) -> bool {
        self.shipment.is_completed()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Deletes cached shipment entries after mutations.
#[derive(Clone)]
pub struct CacheInvalidator {
    store: Arc<dyn KeyValueStore>,
    counters: Arc<Counters>,
}

impl CacheInvalidator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Drop the cached entry for `tracking_number`. Never fails; a missing
    /// entry is fine.
    pub async fn invalidate(&self, tracking_number: &str) {
        let key = keys::shipment(tracking_number);
        match self.store.delete(&key).await {
            Ok(existed) => {
                self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("cache_invalidations_total", "result" => "ok").increment(1);
                debug!(tracking_number = %tracking_number, existed = %existed, "Invalidated shipment cache");
            }
            Err(e) => {
                metrics::counter!("cache_invalidations_total", "result" => "error").increment(1);
                error_logging::log_store_error(&e, "cache_invalidate", &key);
            }
        }
    }
}

/// Read-through cache for [`ShipmentDetails`].
#[derive(Clone)]
pub struct ShipmentCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    invalidator: CacheInvalidator,
}

impl ShipmentCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, SHIPMENT_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self {
            invalidator: CacheInvalidator::new(store.clone()),
            store,
            ttl,
        }
    }

    /// Cached details, or `None` on a miss, a store error or an unreadable entry.
    pub async fn get(&self, tracking_number: &str) -> Option<ShipmentDetails> {
        let key = keys::shipment(tracking_number);
        let cached = match self.store.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                error_logging::log_store_error(&e, "cache_get", &key);
                None
            }
        };

        let details = cached.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(details) => Some(details),
            Err(e) => {
                error_logging::log_store_error(&e, "cache_decode", &key);
                None
            }
        });

        let counters = &self.invalidator.counters;
        if details.is_some() {
            counters.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cache_lookups_total", "result" => "hit").increment(1);
            debug!(tracking_number = %tracking_number, "Shipment cache hit");
        } else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cache_lookups_total", "result" => "miss").increment(1);
        }
        details
    }

    /// Store `details` for the configured TTL.
    pub async fn put(&self, details: &ShipmentDetails) {
        let key = keys::shipment(details.tracking_number());
        let raw = match serde_json::to_string(details) {
            Ok(raw) => raw,
            Err(e) => {
                error_logging::log_internal_error(&e, "cache", "encode shipment", None);
                return;
            }
        };
        if let Err(e) = self.store.set_ex(&key, &raw, self.ttl).await {
            error_logging::log_store_error(&e, "cache_put", &key);
        }
    }

    pub async fn invalidate(&self, tracking_number: &str) {
        self.invalidator.invalidate(tracking_number).await
    }

    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let counters = &self.invalidator.counters;
        let hits = counters.hits.load(Ordering::Relaxed);
        let misses = counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            invalidations: counters.invalidations.load(Ordering::Relaxed),
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn details(tn: &str) -> ShipmentDetails {
        let now = Utc::now();
        ShipmentDetails {
            shipment: Shipment {
                tracking_number: tn.to_string(),
                status: "In_Transit".to_string(),
                checkpoints: "Lagos, NG".to_string(),
                delivery_location: "Abuja, NG".to_string(),
                origin_location: "Lagos, NG".to_string(),
                recipient_email: None,
                webhook_url: None,
                email_notifications: true,
                created_at: now,
                last_updated: now,
            },
            paused: false,
            speed_multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn test_read_through_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let cache = ShipmentCache::new(store.clone());

        assert!(cache.get("TRK1").await.is_none());
        let cached = details("TRK1");
        cache.put(&cached).await;
        assert_eq!(cache.get("TRK1").await, Some(cached));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let store = Arc::new(MemoryStore::new());
        let cache = ShipmentCache::new(store.clone());
        cache.put(&details("TRK2")).await;
        assert!(store.get("shipment:TRK2").await.unwrap().is_some());

        cache.invalidate("TRK2").await;
        assert!(store.get("shipment:TRK2").await.unwrap().is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_invalidate_missing_entry_is_fine() {
        let store = Arc::new(MemoryStore::new());
        let invalidator = CacheInvalidator::new(store.clone());
        invalidator.invalidate("NOPE").await;
        invalidator.invalidate("NOPE").await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_ex("shipment:TRK3", "{not json", SHIPMENT_CACHE_TTL)
            .await
            .unwrap();
        let cache = ShipmentCache::new(store);
        assert!(cache.get("TRK3").await.is_none());
    }
}
