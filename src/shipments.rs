//! Shipment operations behind the bot's commands and buttons.
//!
//! [`ShipmentService`] owns the repository, the shared store, the cache, the
//! simulation controls and the notifier. Every mutation invalidates or
//! refreshes `shipment:{tracking_number}` before it returns.

use std::sync::Arc;

use chrono::{Local, Utc};
use rand::Rng;
use tracing::{info, warn};

use crate::cache::{ShipmentCache, ShipmentDetails};
use crate::config::AdminConfig;
use crate::db::{Shipment, ShipmentPage, ShipmentRepository, PAGE_SIZE};
use crate::errors::{error_logging, AppError, AppResult};
use crate::notifications::{BroadcastOutcome, EmailJob, Notifier, WebhookPayload};
use crate::simulation::SimulationControl;
use crate::store::KeyValueStore;
use crate::validation::{
    sanitize_tracking_number, validate_email, validate_location, validate_status,
    validate_webhook_url, ShipmentInput,
};

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_SUFFIX_LEN: usize = 6;
const ID_MAX_ATTEMPTS: usize = 10;

/// Per-chat selections made in the batch and bulk pickers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionSet {
    BatchDelete,
    BulkPause,
    BulkResume,
}

impl SelectionSet {
    pub fn key(self, chat_id: i64) -> String {
        let prefix = match self {
            SelectionSet::BatchDelete => "batch_delete",
            SelectionSet::BulkPause => "bulk_pause",
            SelectionSet::BulkResume => "bulk_resume",
        };
        format!("{}:{}", prefix, chat_id)
    }
}

/// Figures shown by `/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShipmentStats {
    pub total: u64,
    pub active: u64,
    pub paused: u64,
    pub queue_length: u64,
}

/// Result of [`ShipmentService::save`]
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub shipment: Shipment,
    pub created: bool,
}

pub fn not_found(tracking_number: &str) -> AppError {
    AppError::NotFound(format!("Shipment `{}` not found.", tracking_number))
}

/// Normalized tracking number, or "Invalid tracking number."
pub fn require_tracking_number(input: &str) -> AppResult<String> {
    sanitize_tracking_number(input)
        .ok_or_else(|| AppError::Validation("Invalid tracking number.".to_string()))
}

fn random_tracking_number() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("TRK{}{}", Local::now().format("%Y%m%d%H%M%S"), suffix)
}

/// Slice one page out of an in-memory list, 1-based.
fn paginate(items: Vec<String>, page: u32) -> ShipmentPage {
    let total = items.len() as u64;
    let offset = (page.max(1) as usize - 1) * PAGE_SIZE as usize;
    ShipmentPage {
        tracking_numbers: items
            .into_iter()
            .skip(offset)
            .take(PAGE_SIZE as usize)
            .collect(),
        total,
    }
}

#[derive(Clone)]
pub struct ShipmentService {
    repository: Arc<dyn ShipmentRepository>,
    store: Arc<dyn KeyValueStore>,
    cache: ShipmentCache,
    simulation: SimulationControl,
    notifier: Arc<dyn Notifier>,
    admin: Arc<AdminConfig>,
    mail_from: String,
}

impl ShipmentService {
    pub fn new(
        repository: Arc<dyn ShipmentRepository>,
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        admin: Arc<AdminConfig>,
        mail_from: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            cache: ShipmentCache::new(store.clone()),
            simulation: SimulationControl::new(store.clone()),
            store,
            notifier,
            admin,
            mail_from: mail_from.into(),
        }
    }

    pub fn cache(&self) -> &ShipmentCache {
        &self.cache
    }

    pub fn admin(&self) -> &AdminConfig {
        &self.admin
    }

    /// Whether `send_webhook` has somewhere to go for shipments without a URL
    pub fn has_default_webhook(&self) -> bool {
        !self.notifier.default_webhook_url().is_empty()
    }

    /// Shipment plus simulation state, read through the cache.
    pub async fn details(&self, tracking_number: &str) -> AppResult<Option<ShipmentDetails>> {
        if let Some(cached) = self.cache.get(tracking_number).await {
            return Ok(Some(cached));
        }
        let Some(shipment) = self.repository.find(tracking_number).await? else {
            return Ok(None);
        };
        let details = self.enrich(shipment).await;
        self.cache.put(&details).await;
        Ok(Some(details))
    }

    pub async fn require_details(&self, tracking_number: &str) -> AppResult<ShipmentDetails> {
        self.details(tracking_number)
            .await?
            .ok_or_else(|| not_found(tracking_number))
    }

    async fn enrich(&self, shipment: Shipment) -> ShipmentDetails {
        let tn = shipment.tracking_number.clone();
        let paused = self.simulation.is_paused(&tn).await.unwrap_or_else(|e| {
            error_logging::log_store_error(&e, "read_paused", &tn);
            false
        });
        let speed_multiplier = self.simulation.speed(&tn).await.unwrap_or_else(|e| {
            error_logging::log_store_error(&e, "read_speed", &tn);
            crate::simulation::DEFAULT_SPEED
        });
        ShipmentDetails {
            shipment,
            paused,
            speed_multiplier,
        }
    }

    async fn require_exists(&self, tracking_number: &str) -> AppResult<()> {
        if self.repository.exists(tracking_number).await? {
            Ok(())
        } else {
            Err(not_found(tracking_number))
        }
    }

    /// Fresh `TRK{local timestamp}{6 chars}` not present in the repository.
    pub async fn generate_unique_id(&self) -> AppResult<String> {
        for _ in 0..ID_MAX_ATTEMPTS {
            let candidate = random_tracking_number();
            if !self.repository.exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!(tracking_number = %candidate, "Generated tracking number already exists, retrying");
        }
        Err(AppError::Internal(
            "Failed to generate a unique tracking number".to_string(),
        ))
    }

    fn validate_input(&self, input: &ShipmentInput) -> AppResult<String> {
        let tracking_number = require_tracking_number(&input.tracking_number)?;
        if !validate_status(&input.status, &self.admin.valid_statuses) {
            return Err(AppError::Validation(format!(
                "Invalid status. Must be one of: {}",
                self.admin.valid_statuses.join(", ")
            )));
        }
        let locations = || {
            self.admin
                .route_templates
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        if !validate_location(&input.delivery_location, &self.admin.route_templates) {
            return Err(AppError::Validation(format!(
                "Invalid delivery location. Must be one of: {}",
                locations()
            )));
        }
        if let Some(origin) = &input.origin_location {
            if !validate_location(origin, &self.admin.route_templates) {
                return Err(AppError::Validation(format!(
                    "Invalid origin location. Must be one of: {}",
                    locations()
                )));
            }
        }
        if let Some(email) = &input.recipient_email {
            if !validate_email(email) {
                return Err(AppError::Validation("Invalid recipient email".to_string()));
            }
        }
        if let Some(url) = &input.webhook_url {
            if !validate_webhook_url(url) {
                return Err(AppError::Validation("Invalid webhook URL".to_string()));
            }
        }
        Ok(tracking_number)
    }

    /// Create or update a shipment, refresh its cache entry, then fire the
    /// email job, webhook and broadcast. Notification failures are logged.
    pub async fn save(&self, input: &ShipmentInput) -> AppResult<SaveOutcome> {
        let tracking_number = self.validate_input(input)?;
        let existing = self.repository.find(&tracking_number).await?;
        let now = Utc::now();

        let shipment = Shipment {
            tracking_number: tracking_number.clone(),
            status: input.status.clone(),
            checkpoints: existing
                .as_ref()
                .map(|s| s.checkpoints.clone())
                .unwrap_or_default(),
            delivery_location: input.delivery_location.clone(),
            origin_location: input
                .origin_location
                .clone()
                .unwrap_or_else(|| input.delivery_location.clone()),
            recipient_email: input.recipient_email.clone(),
            webhook_url: input.webhook_url.clone(),
            email_notifications: existing.as_ref().map_or(true, |s| s.email_notifications),
            created_at: existing.as_ref().map_or(now, |s| s.created_at),
            last_updated: now,
        };

        let saved = self.repository.save(&shipment).await?;
        let details = self.enrich(saved.clone()).await;
        self.cache.put(&details).await;
        info!(
            tracking_number = %tracking_number,
            status = %saved.status,
            created = %existing.is_none(),
            "Saved shipment"
        );

        if let Some(job) = EmailJob::for_shipment(&saved, &self.mail_from) {
            if let Err(e) = self.notifier.enqueue_email(&job).await {
                error_logging::log_internal_error(&e, "notifications", "enqueue_email", None);
            }
        }
        if let Some(url) = saved.webhook_url.as_deref() {
            // send_webhook already logs its own failures
            let _ = self
                .notifier
                .send_webhook(&WebhookPayload::for_shipment(&saved), url)
                .await;
        }
        self.broadcast_quietly(&tracking_number).await;

        Ok(SaveOutcome {
            shipment: saved,
            created: existing.is_none(),
        })
    }

    /// Remove the row, its cache entry and its simulation state.
    pub async fn delete(&self, tracking_number: &str) -> AppResult<()> {
        if !self.repository.delete(tracking_number).await? {
            return Err(not_found(tracking_number));
        }
        self.cache.invalidate(tracking_number).await;
        if let Err(e) = self.simulation.clear(tracking_number).await {
            error_logging::log_store_error(&e, "clear_simulation", tracking_number);
        }
        info!(tracking_number = %tracking_number, "Deleted shipment");
        Ok(())
    }

    pub async fn set_webhook(&self, tracking_number: &str, url: &str) -> AppResult<()> {
        if !validate_webhook_url(url) {
            return Err(AppError::Validation(
                "Invalid webhook URL. Must be http(s) with a host.".to_string(),
            ));
        }
        if !self.repository.set_webhook(tracking_number, Some(url)).await? {
            return Err(not_found(tracking_number));
        }
        self.cache.invalidate(tracking_number).await;
        info!(tracking_number = %tracking_number, url = %url, "Webhook URL updated");
        Ok(())
    }

    /// Flip email notifications; returns the new setting.
    pub async fn toggle_email(&self, tracking_number: &str) -> AppResult<bool> {
        let enabled = self
            .repository
            .toggle_email(tracking_number)
            .await?
            .ok_or_else(|| not_found(tracking_number))?;
        self.cache.invalidate(tracking_number).await;
        info!(tracking_number = %tracking_number, enabled = %enabled, "Email notifications toggled");
        Ok(enabled)
    }

    fn ensure_active(details: &ShipmentDetails) -> AppResult<()> {
        if details.is_completed() {
            return Err(AppError::Validation(format!(
                "Shipment `{}` is already completed (`{}`).",
                details.tracking_number(),
                details.shipment.status
            )));
        }
        Ok(())
    }

    pub async fn pause(&self, tracking_number: &str) -> AppResult<()> {
        let details = self.require_details(tracking_number).await?;
        Self::ensure_active(&details)?;
        if self.simulation.is_paused(tracking_number).await? {
            return Err(AppError::Validation(format!(
                "Simulation for `{}` is already paused.",
                tracking_number
            )));
        }
        self.simulation.pause(tracking_number).await?;
        self.cache.invalidate(tracking_number).await;
        self.broadcast_quietly(tracking_number).await;
        Ok(())
    }

    pub async fn resume(&self, tracking_number: &str) -> AppResult<()> {
        let details = self.require_details(tracking_number).await?;
        Self::ensure_active(&details)?;
        if !self.simulation.is_paused(tracking_number).await? {
            return Err(AppError::Validation(format!(
                "Simulation for `{}` is not paused.",
                tracking_number
            )));
        }
        self.simulation.resume(tracking_number).await?;
        self.cache.invalidate(tracking_number).await;
        self.broadcast_quietly(tracking_number).await;
        Ok(())
    }

    pub async fn set_speed(&self, tracking_number: &str, speed: f64) -> AppResult<()> {
        self.require_exists(tracking_number).await?;
        self.simulation.set_speed(tracking_number, speed).await?;
        self.cache.invalidate(tracking_number).await;
        Ok(())
    }

    pub async fn speed(&self, tracking_number: &str) -> AppResult<f64> {
        self.require_exists(tracking_number).await?;
        self.simulation.speed(tracking_number).await
    }

    pub async fn broadcast(&self, tracking_number: &str) -> AppResult<BroadcastOutcome> {
        self.require_exists(tracking_number).await?;
        self.notifier.broadcast(tracking_number).await
    }

    async fn broadcast_quietly(&self, tracking_number: &str) {
        // failures are logged by the notifier
        let _ = self.notifier.broadcast(tracking_number).await;
    }

    /// Queue an email for the shipment's recipient.
    pub async fn send_email(&self, tracking_number: &str) -> AppResult<()> {
        let details = self.require_details(tracking_number).await?;
        let job = EmailJob::for_shipment(&details.shipment, &self.mail_from).ok_or_else(|| {
            AppError::Validation(format!(
                "Email notifications disabled or no recipient email for `{}`.",
                tracking_number
            ))
        })?;
        self.notifier.enqueue_email(&job).await
    }

    /// POST the shipment to its webhook, or to the websocket server when it
    /// has none. Returns the URL used.
    pub async fn send_webhook(&self, tracking_number: &str) -> AppResult<String> {
        let details = self.require_details(tracking_number).await?;
        let url = details
            .shipment
            .webhook_url
            .clone()
            .unwrap_or_else(|| self.notifier.default_webhook_url().to_string());
        self.notifier
            .send_webhook(&WebhookPayload::for_shipment(&details.shipment), &url)
            .await?;
        Ok(url)
    }

    pub async fn list(&self, page: u32) -> AppResult<ShipmentPage> {
        self.repository.list(page).await
    }

    pub async fn list_active(&self, page: u32) -> AppResult<ShipmentPage> {
        self.repository.list_active(page).await
    }

    pub async fn list_paused(&self, page: u32) -> AppResult<ShipmentPage> {
        Ok(paginate(self.simulation.paused_tracking_numbers().await?, page))
    }

    pub async fn search(&self, query: &str, page: u32) -> AppResult<ShipmentPage> {
        self.repository.search(query, page).await
    }

    /// Totals for `/stats`. Store-backed figures fall back to zero.
    pub async fn stats(&self) -> AppResult<ShipmentStats> {
        let counts = self.repository.counts().await?;
        let paused = self.simulation.paused_count().await.unwrap_or_else(|e| {
            error_logging::log_store_error(&e, "stats_paused", crate::store::keys::PAUSED_SIMULATIONS);
            0
        });
        let queue_length = self.notifier.queue_length().await.unwrap_or_else(|e| {
            error_logging::log_store_error(&e, "stats_queue", crate::store::keys::NOTIFICATION_QUEUE);
            0
        });
        Ok(ShipmentStats {
            total: counts.total,
            active: counts.active,
            paused,
            queue_length,
        })
    }

    /// Select or deselect; returns `true` when now selected.
    pub async fn toggle_selection(
        &self,
        set: SelectionSet,
        chat_id: i64,
        tracking_number: &str,
    ) -> AppResult<bool> {
        let key = set.key(chat_id);
        if self.store.srem(&key, tracking_number).await? {
            Ok(false)
        } else {
            self.store.sadd(&key, tracking_number).await?;
            Ok(true)
        }
    }

    pub async fn selection(&self, set: SelectionSet, chat_id: i64) -> AppResult<Vec<String>> {
        self.store.smembers(&set.key(chat_id)).await
    }

    /// Delete every selected shipment; returns how many were selected.
    pub async fn batch_delete(&self, chat_id: i64) -> AppResult<usize> {
        let selected = self.selection(SelectionSet::BatchDelete, chat_id).await?;
        if selected.is_empty() {
            return Err(AppError::Validation(
                "No shipments selected for deletion.".to_string(),
            ));
        }
        for tracking_number in &selected {
            match self.delete(tracking_number).await {
                Ok(()) | Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.store
            .delete(&SelectionSet::BatchDelete.key(chat_id))
            .await?;
        info!(chat_id = %chat_id, count = selected.len(), "Batch deleted shipments");
        Ok(selected.len())
    }

    /// Pause every selected, active, running shipment; returns how many changed.
    pub async fn bulk_pause(&self, chat_id: i64) -> AppResult<usize> {
        self.bulk_apply(SelectionSet::BulkPause, chat_id, true).await
    }

    /// Resume every selected, active, paused shipment; returns how many changed.
    pub async fn bulk_resume(&self, chat_id: i64) -> AppResult<usize> {
        self.bulk_apply(SelectionSet::BulkResume, chat_id, false).await
    }

    async fn bulk_apply(&self, set: SelectionSet, chat_id: i64, pause: bool) -> AppResult<usize> {
        let selected = self.selection(set, chat_id).await?;
        if selected.is_empty() {
            let verb = if pause { "pausing" } else { "resuming" };
            return Err(AppError::Validation(format!(
                "No shipments selected for {}.",
                verb
            )));
        }

        let mut changed = 0;
        for tracking_number in &selected {
            let result = if pause {
                self.pause(tracking_number).await
            } else {
                self.resume(tracking_number).await
            };
            match result {
                Ok(()) => changed += 1,
                Err(AppError::Validation(_)) | Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.store.delete(&set.key(chat_id)).await?;
        info!(chat_id = %chat_id, changed = changed, pause = pause, "Bulk simulation update");
        Ok(changed)
    }
}
