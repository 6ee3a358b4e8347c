//! # Shared Key-Value Store
//!
//! The bot shares a Redis instance with the web application: rate-limit
//! counters, the shipment read-through cache, simulation control hashes, menu
//! selection sets and the email notification queue all live there.
//!
//! Everything goes through [`KeyValueStore`] so the limiter, cache and
//! simulation controls can be handed a [`RedisStore`] in production and a
//! [`MemoryStore`] when no Redis is configured or under test.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Key layout shared with the web application.
pub mod keys {
    /// Hash of tracking number to `"true"` for paused simulations
    pub const PAUSED_SIMULATIONS: &str = "paused_simulations";
    /// Hash of tracking number to speed multiplier
    pub const SPEED_MULTIPLIERS: &str = "sim_speed_multipliers";
    /// List of queued email jobs
    pub const NOTIFICATION_QUEUE: &str = "notification_queue";
    /// JSON route templates
    pub const ROUTE_TEMPLATES: &str = "route_templates";

    pub fn rate_limit(user_id: i64) -> String {
        format!("rate_limit:{}", user_id)
    }

    pub fn shipment(tracking_number: &str) -> String {
        format!("shipment:{}", tracking_number)
    }
}

/// Atomic primitives the bot needs from its store.
///
/// Each call is a single round trip; callers that need several primitives
/// accept that the sequence as a whole is not atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Increment an integer key by one and return the new value
    async fn incr(&self, key: &str) -> AppResult<i64>;
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()>;
    /// Remaining lifetime in seconds, Redis style: `-2` when the key is
    /// missing and `-1` when it never expires
    async fn ttl(&self, key: &str) -> AppResult<i64>;
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;
    /// Returns whether a key was removed
    async fn delete(&self, key: &str) -> AppResult<bool>;

    async fn hget(&self, key: &str, field: &str) -> AppResult<Option<String>>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> AppResult<()>;
    async fn hdel(&self, key: &str, field: &str) -> AppResult<bool>;
    async fn hkeys(&self, key: &str) -> AppResult<Vec<String>>;
    async fn hlen(&self, key: &str) -> AppResult<u64>;

    /// Returns whether the member was newly added
    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool>;
    async fn srem(&self, key: &str, member: &str) -> AppResult<bool>;
    async fn smembers(&self, key: &str) -> AppResult<Vec<String>>;

    /// Append to a list and return its new length
    async fn rpush(&self, key: &str, value: &str) -> AppResult<u64>;
    async fn llen(&self, key: &str) -> AppResult<u64>;

    async fn ping(&self) -> AppResult<()>;
}

/// Redis-backed store using a multiplexed connection per operation.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Open a client for `url`. No connection is made until the first call.
    pub fn open(url: &str) -> AppResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Config(format!("Invalid REDIS_URL: {}", e)))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn incr(&self, key: &str) -> AppResult<i64> {
        let mut conn = self.connection().await?;
        Ok(conn.incr(key, 1).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: bool = conn.expire(key, ttl.as_secs() as i64).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> AppResult<i64> {
        let mut conn = self.connection().await?;
        Ok(conn.ttl(key).await?)
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn hget(&self, key: &str, field: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn hkeys(&self, key: &str) -> AppResult<Vec<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.hkeys(key).await?)
    }

    async fn hlen(&self, key: &str) -> AppResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.hlen(key).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> AppResult<Vec<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn rpush(&self, key: &str, value: &str) -> AppResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.rpush(key, value).await?)
    }

    async fn llen(&self, key: &str) -> AppResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.llen(key).await?)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store with Redis-like semantics, including key expiry.
///
/// Used when `REDIS_URL` is unset (single bot instance, nothing shared with
/// the web app) and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the live entry for `key`, dropping it first if it expired.
    fn with_entry<T>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> T) -> T {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            debug!(key = %key, "Expired key evicted from memory store");
            entries.remove(key);
        }
        f(entries.get_mut(key))
    }

    fn with_entry_or_insert<T>(
        &self,
        key: &str,
        empty: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Entry) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(empty()));
        f(entry)
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::Store(format!(
        "WRONGTYPE Operation against key '{}' holding the wrong kind of value",
        key
    ))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn incr(&self, key: &str) -> AppResult<i64> {
        self.with_entry_or_insert(
            key,
            || Value::Text("0".to_string()),
            |entry| match &mut entry.value {
                Value::Text(text) => {
                    let current: i64 = text.parse().map_err(|_| {
                        AppError::Store(format!("value at '{}' is not an integer", key))
                    })?;
                    let next = current + 1;
                    *text = next.to_string();
                    Ok(next)
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        self.with_entry(key, |entry| {
            if let Some(entry) = entry {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        });
        Ok(())
    }

    async fn ttl(&self, key: &str) -> AppResult<i64> {
        Ok(self.with_entry(key, |entry| match entry {
            None => -2,
            Some(Entry { expires_at: None, .. }) => -1,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_duration_since(Instant::now());
                // Round up so a live key never reports zero
                remaining.as_millis().div_ceil(1000) as i64
            }
        }))
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.with_entry(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        let removed = self.entries.lock().remove(key);
        Ok(removed.is_some_and(|e| !e.is_expired(now)))
    }

    async fn hget(&self, key: &str, field: &str) -> AppResult<Option<String>> {
        self.with_entry(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> AppResult<()> {
        self.with_entry_or_insert(
            key,
            || Value::Hash(HashMap::new()),
            |entry| match &mut entry.value {
                Value::Hash(hash) => {
                    hash.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn hdel(&self, key: &str, field: &str) -> AppResult<bool> {
        self.with_entry(key, |entry| match entry.map(|e| &mut e.value) {
            None => Ok(false),
            Some(Value::Hash(hash)) => Ok(hash.remove(field).is_some()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn hkeys(&self, key: &str) -> AppResult<Vec<String>> {
        self.with_entry(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Hash(hash)) => {
                let mut fields: Vec<String> = hash.keys().cloned().collect();
                fields.sort();
                Ok(fields)
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn hlen(&self, key: &str) -> AppResult<u64> {
        self.with_entry(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(0),
            Some(Value::Hash(hash)) => Ok(hash.len() as u64),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool> {
        self.with_entry_or_insert(
            key,
            || Value::Set(HashSet::new()),
            |entry| match &mut entry.value {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn srem(&self, key: &str, member: &str) -> AppResult<bool> {
        self.with_entry(key, |entry| match entry.map(|e| &mut e.value) {
            None => Ok(false),
            Some(Value::Set(set)) => Ok(set.remove(member)),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn smembers(&self, key: &str) -> AppResult<Vec<String>> {
        self.with_entry(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn rpush(&self, key: &str, value: &str) -> AppResult<u64> {
        self.with_entry_or_insert(
            key,
            || Value::List(VecDeque::new()),
            |entry| match &mut entry.value {
                Value::List(list) => {
                    list.push_back(value.to_string());
                    Ok(list.len() as u64)
                }
                _ => Err(wrong_type(key)),
            },
        )
    }

    async fn llen(&self, key: &str) -> AppResult<u64> {
        self.with_entry(key, |entry| match entry.map(|e| &e.value) {
            None => Ok(0),
            Some(Value::List(list)) => Ok(list.len() as u64),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::rate_limit(42), "rate_limit:42");
        assert_eq!(keys::shipment("TRK1"), "shipment:TRK1");
    }

    #[tokio::test]
    async fn test_incr_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.get("counter").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_expired_keys_disappear() {
        let store = MemoryStore::new();
        store
            .set_ex("short", "v", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(store.get("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("short").await.unwrap().is_none());
        assert!(!store.delete("short").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_is_noop() {
        let store = MemoryStore::new();
        store.expire("nothing", Duration::from_secs(1)).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_reports_missing_persistent_and_expiring_keys() {
        let store = MemoryStore::new();
        assert_eq!(store.ttl("missing").await.unwrap(), -2);

        store.incr("counter").await.unwrap();
        assert_eq!(store.ttl("counter").await.unwrap(), -1);

        store.expire("counter", Duration::from_secs(30)).await.unwrap();
        let remaining = store.ttl("counter").await.unwrap();
        assert!((1..=30).contains(&remaining), "remaining = {}", remaining);
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryStore::new();
        store.hset("h", "b", "2").await.unwrap();
        store.hset("h", "a", "1").await.unwrap();

        assert_eq!(store.hget("h", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.hlen("h").await.unwrap(), 2);
        assert_eq!(store.hkeys("h").await.unwrap(), vec!["a", "b"]);
        assert!(store.hdel("h", "a").await.unwrap());
        assert!(!store.hdel("h", "a").await.unwrap());
        assert_eq!(store.hget("missing", "a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_and_list_operations() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "x").await.unwrap());
        assert!(!store.sadd("s", "x").await.unwrap());
        assert_eq!(store.smembers("s").await.unwrap(), vec!["x"]);
        assert!(store.srem("s", "x").await.unwrap());

        assert_eq!(store.rpush("l", "one").await.unwrap(), 1);
        assert_eq!(store.rpush("l", "two").await.unwrap(), 2);
        assert_eq!(store.llen("l").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_wrong_type_is_store_error() {
        let store = MemoryStore::new();
        store.hset("h", "f", "v").await.unwrap();
        assert!(matches!(store.incr("h").await, Err(AppError::Store(_))));
        assert!(matches!(store.get("h").await, Err(AppError::Store(_))));
    }
}
