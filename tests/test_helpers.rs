//! # Test Helper Library
//!
//! In-memory stand-ins for the repository, notifier and a store that is down,
//! plus builders that wire them into a ready [`AdminContext`].

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shipment_admin_bot::bot::AdminContext;
use shipment_admin_bot::config::{AdminConfig, COMPLETED_STATUSES};
use shipment_admin_bot::db::{Shipment, ShipmentCounts, ShipmentPage, ShipmentRepository, PAGE_SIZE};
use shipment_admin_bot::errors::{AppError, AppResult};
use shipment_admin_bot::notifications::{BroadcastOutcome, EmailJob, Notifier, WebhookPayload};
use shipment_admin_bot::rate_limiter::RateLimiter;
use shipment_admin_bot::shipments::ShipmentService;
use shipment_admin_bot::store::{KeyValueStore, MemoryStore};

pub const ADMIN_ID: i64 = 1001;
pub const STRANGER_ID: i64 = 2002;
pub const CHAT_ID: i64 = 1001;
pub const DEFAULT_WEBHOOK: &str = "https://tracker.example.com";

pub fn admin_config() -> AdminConfig {
    AdminConfig {
        allowed_admins: HashSet::from([ADMIN_ID]),
        route_templates: BTreeMap::from([
            ("Lagos, NG".to_string(), vec!["Lagos, NG".to_string()]),
            (
                "Abuja, NG".to_string(),
                vec!["Lagos, NG".to_string(), "Abuja, NG".to_string()],
            ),
        ]),
        ..AdminConfig::default()
    }
}

pub fn sample_shipment(tracking_number: &str, status: &str) -> Shipment {
    let now = Utc::now();
    Shipment {
        tracking_number: tracking_number.to_string(),
        status: status.to_string(),
        checkpoints: String::new(),
        delivery_location: "Lagos, NG".to_string(),
        origin_location: "Abuja, NG".to_string(),
        recipient_email: Some("user@example.com".to_string()),
        webhook_url: None,
        email_notifications: true,
        created_at: now,
        last_updated: now,
    }
}

/// Shipments in a sorted map, counting every call
#[derive(Default)]
pub struct InMemoryRepository {
    shipments: Mutex<BTreeMap<String, Shipment>>,
    calls: AtomicUsize,
}

impl InMemoryRepository {
    pub fn with(shipments: Vec<Shipment>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.shipments.lock();
            for shipment in shipments {
                map.insert(shipment.tracking_number.clone(), shipment);
            }
        }
        repo
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, tracking_number: &str) -> Option<Shipment> {
        self.shipments.lock().get(tracking_number).cloned()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn page_of(&self, filter: impl Fn(&Shipment) -> bool, page: u32) -> ShipmentPage {
        let matching: Vec<String> = self
            .shipments
            .lock()
            .values()
            .filter(|s| filter(s))
            .map(|s| s.tracking_number.clone())
            .collect();
        let offset = (page.max(1) - 1) as usize * PAGE_SIZE as usize;
        ShipmentPage {
            total: matching.len() as u64,
            tracking_numbers: matching
                .into_iter()
                .skip(offset)
                .take(PAGE_SIZE as usize)
                .collect(),
        }
    }
}

#[async_trait]
impl ShipmentRepository for InMemoryRepository {
    async fn find(&self, tracking_number: &str) -> AppResult<Option<Shipment>> {
        self.touch();
        Ok(self.get(tracking_number))
    }

    async fn save(&self, shipment: &Shipment) -> AppResult<Shipment> {
        self.touch();
        let mut saved = shipment.clone();
        saved.last_updated = Utc::now();
        self.shipments
            .lock()
            .insert(saved.tracking_number.clone(), saved.clone());
        Ok(saved)
    }

    async fn delete(&self, tracking_number: &str) -> AppResult<bool> {
        self.touch();
        Ok(self.shipments.lock().remove(tracking_number).is_some())
    }

    async fn set_webhook(&self, tracking_number: &str, webhook_url: Option<&str>) -> AppResult<bool> {
        self.touch();
        match self.shipments.lock().get_mut(tracking_number) {
            Some(shipment) => {
                shipment.webhook_url = webhook_url.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn toggle_email(&self, tracking_number: &str) -> AppResult<Option<bool>> {
        self.touch();
        Ok(self.shipments.lock().get_mut(tracking_number).map(|s| {
            s.email_notifications = !s.email_notifications;
            s.email_notifications
        }))
    }

    async fn list(&self, page: u32) -> AppResult<ShipmentPage> {
        self.touch();
        Ok(self.page_of(|_| true, page))
    }

    async fn list_active(&self, page: u32) -> AppResult<ShipmentPage> {
        self.touch();
        Ok(self.page_of(|s| !COMPLETED_STATUSES.contains(&s.status.as_str()), page))
    }

    async fn search(&self, query: &str, page: u32) -> AppResult<ShipmentPage> {
        self.touch();
        let needle = query.to_lowercase();
        Ok(self.page_of(
            |s| {
                [&s.tracking_number, &s.status, &s.delivery_location]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            },
            page,
        ))
    }

    async fn counts(&self) -> AppResult<ShipmentCounts> {
        self.touch();
        let map = self.shipments.lock();
        Ok(ShipmentCounts {
            total: map.len() as u64,
            active: map.values().filter(|s| !s.is_completed()).count() as u64,
        })
    }
}

/// Records every outbound notification instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    pub broadcasts: Mutex<Vec<String>>,
    pub webhooks: Mutex<Vec<(String, WebhookPayload)>>,
    pub emails: Mutex<Vec<EmailJob>>,
}

impl RecordingNotifier {
    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn broadcast(&self, tracking_number: &str) -> AppResult<BroadcastOutcome> {
        self.broadcasts.lock().push(tracking_number.to_string());
        Ok(BroadcastOutcome::Triggered)
    }

    async fn send_webhook(&self, payload: &WebhookPayload, url: &str) -> AppResult<()> {
        self.webhooks.lock().push((url.to_string(), payload.clone()));
        Ok(())
    }

    async fn enqueue_email(&self, job: &EmailJob) -> AppResult<()> {
        self.emails.lock().push(job.clone());
        Ok(())
    }

    async fn queue_length(&self) -> AppResult<u64> {
        Ok(self.emails.lock().len() as u64)
    }

    fn default_webhook_url(&self) -> &str {
        DEFAULT_WEBHOOK
    }
}

/// A store whose every call fails, as if Redis were unreachable
pub struct FailingStore;

fn down<T>() -> AppResult<T> {
    Err(AppError::Store("connection refused".to_string()))
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn incr(&self, _key: &str) -> AppResult<i64> {
        down()
    }
    async fn expire(&self, _key: &str, _ttl: Duration) -> AppResult<()> {
        down()
    }
    async fn ttl(&self, _key: &str) -> AppResult<i64> {
        down()
    }
    async fn get(&self, _key: &str) -> AppResult<Option<String>> {
        down()
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> AppResult<()> {
        down()
    }
    async fn delete(&self, _key: &str) -> AppResult<bool> {
        down()
    }
    async fn hget(&self, _key: &str, _field: &str) -> AppResult<Option<String>> {
        down()
    }
    async fn hset(&self, _key: &str, _field: &str, _value: &str) -> AppResult<()> {
        down()
    }
    async fn hdel(&self, _key: &str, _field: &str) -> AppResult<bool> {
        down()
    }
    async fn hkeys(&self, _key: &str) -> AppResult<Vec<String>> {
        down()
    }
    async fn hlen(&self, _key: &str) -> AppResult<u64> {
        down()
    }
    async fn sadd(&self, _key: &str, _member: &str) -> AppResult<bool> {
        down()
    }
    async fn srem(&self, _key: &str, _member: &str) -> AppResult<bool> {
        down()
    }
    async fn smembers(&self, _key: &str) -> AppResult<Vec<String>> {
        down()
    }
    async fn rpush(&self, _key: &str, _value: &str) -> AppResult<u64> {
        down()
    }
    async fn llen(&self, _key: &str) -> AppResult<u64> {
        down()
    }
    async fn ping(&self) -> AppResult<()> {
        down()
    }
}

/// A [`MemoryStore`] whose first `expire` call fails, as after a Redis blip
/// between `INCR` and `EXPIRE`
#[derive(Default)]
pub struct LostExpiryStore {
    inner: MemoryStore,
    expiry_lost: AtomicBool,
}

#[async_trait]
impl KeyValueStore for LostExpiryStore {
    async fn incr(&self, key: &str) -> AppResult<i64> {
        self.inner.incr(key).await
    }
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        if !self.expiry_lost.swap(true, Ordering::SeqCst) {
            return down();
        }
        self.inner.expire(key, ttl).await
    }
    async fn ttl(&self, key: &str) -> AppResult<i64> {
        self.inner.ttl(key).await
    }
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.inner.get(key).await
    }
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.inner.set_ex(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> AppResult<bool> {
        self.inner.delete(key).await
    }
    async fn hget(&self, key: &str, field: &str) -> AppResult<Option<String>> {
        self.inner.hget(key, field).await
    }
    async fn hset(&self, key: &str, field: &str, value: &str) -> AppResult<()> {
        self.inner.hset(key, field, value).await
    }
    async fn hdel(&self, key: &str, field: &str) -> AppResult<bool> {
        self.inner.hdel(key, field).await
    }
    async fn hkeys(&self, key: &str) -> AppResult<Vec<String>> {
        self.inner.hkeys(key).await
    }
    async fn hlen(&self, key: &str) -> AppResult<u64> {
        self.inner.hlen(key).await
    }
    async fn sadd(&self, key: &str, member: &str) -> AppResult<bool> {
        self.inner.sadd(key, member).await
    }
    async fn srem(&self, key: &str, member: &str) -> AppResult<bool> {
        self.inner.srem(key, member).await
    }
    async fn smembers(&self, key: &str) -> AppResult<Vec<String>> {
        self.inner.smembers(key).await
    }
    async fn rpush(&self, key: &str, value: &str) -> AppResult<u64> {
        self.inner.rpush(key, value).await
    }
    async fn llen(&self, key: &str) -> AppResult<u64> {
        self.inner.llen(key).await
    }
    async fn ping(&self) -> AppResult<()> {
        self.inner.ping().await
    }
}

/// Everything a bot test needs to poke at
pub struct Harness {
    pub ctx: AdminContext,
    pub repository: Arc<InMemoryRepository>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<dyn KeyValueStore>,
}

impl Harness {
    /// Generous rate limit over a fresh [`MemoryStore`]
    pub fn new(shipments: Vec<Shipment>) -> Self {
        Self::with_store(shipments, Arc::new(MemoryStore::new()), Duration::from_secs(60), 100)
    }

    pub fn with_store(
        shipments: Vec<Shipment>,
        store: Arc<dyn KeyValueStore>,
        window: Duration,
        max_requests: u64,
    ) -> Self {
        let repository = Arc::new(InMemoryRepository::with(shipments));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = ShipmentService::new(
            repository.clone(),
            store.clone(),
            notifier.clone(),
            Arc::new(admin_config()),
            "no-reply@example.com",
        );
        let limiter = RateLimiter::new(store.clone(), window, max_requests);
        Self {
            ctx: AdminContext::new(service, limiter),
            repository,
            notifier,
            store,
        }
    }
}
