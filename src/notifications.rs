//! Outbound notifications: websocket broadcast trigger, shipment webhooks and
//! the email job queue consumed by the web app's mail worker.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::Shipment;
use crate::errors::{error_logging, AppError, AppResult};
use crate::store::{keys, KeyValueStore};

/// Body POSTed to a shipment webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub tracking_number: String,
    pub status: String,
    pub checkpoints: String,
    pub delivery_location: String,
    pub timestamp: DateTime<Utc>,
}

impl WebhookPayload {
    pub fn for_shipment(shipment: &Shipment) -> Self {
        Self {
            tracking_number: shipment.tracking_number.clone(),
            status: shipment.status.clone(),
            checkpoints: shipment.checkpoints.clone(),
            delivery_location: shipment.delivery_location.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Job pushed onto `notification_queue` for the mail worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub tracking_number: String,
    pub status: String,
    pub checkpoints: String,
    pub delivery_location: String,
    pub recipient_email: String,
    pub from: String,
    pub enqueued_at: DateTime<Utc>,
}

impl EmailJob {
    /// `None` when the shipment has no recipient or notifications are off.
    pub fn for_shipment(shipment: &Shipment, from: &str) -> Option<Self> {
        if !shipment.email_notifications {
            return None;
        }
        let recipient = shipment.recipient_email.as_deref()?;
        Some(Self {
            tracking_number: shipment.tracking_number.clone(),
            status: shipment.status.clone(),
            checkpoints: shipment.checkpoints.clone(),
            delivery_location: shipment.delivery_location.clone(),
            recipient_email: recipient.to_string(),
            from: from.to_string(),
            enqueued_at: Utc::now(),
        })
    }
}

/// Result of asking the websocket server to broadcast a shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Triggered,
    /// Server answered with something other than 204
    Failed(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn broadcast(&self, tracking_number: &str) -> AppResult<BroadcastOutcome>;
    /// POST `payload` to `url`; anything but 200 is an error.
    async fn send_webhook(&self, payload: &WebhookPayload, url: &str) -> AppResult<()>;
    async fn enqueue_email(&self, job: &EmailJob) -> AppResult<()>;
    async fn queue_length(&self) -> AppResult<u64>;
    /// Fallback webhook target when a shipment has none
    fn default_webhook_url(&self) -> &str;
}

/// [`Notifier`] over HTTP and the shared store
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    websocket_server: String,
    store: Arc<dyn KeyValueStore>,
}

impl HttpNotifier {
    pub fn new(
        websocket_server: &str,
        timeout: Duration,
        store: Arc<dyn KeyValueStore>,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            websocket_server: websocket_server.trim_end_matches('/').to_string(),
            store,
        })
    }

    fn broadcast_url(&self, tracking_number: &str) -> String {
        format!("{}/broadcast/{}", self.websocket_server, tracking_number)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn broadcast(&self, tracking_number: &str) -> AppResult<BroadcastOutcome> {
        let url = self.broadcast_url(tracking_number);
        let response = self.client.get(&url).send().await.map_err(|e| {
            error_logging::log_network_error(&e, "broadcast", Some(&url), Some(tracking_number));
            metrics::counter!("notifications_total", "kind" => "broadcast", "result" => "error")
                .increment(1);
            AppError::from(e)
        })?;

        if response.status() == StatusCode::NO_CONTENT {
            metrics::counter!("notifications_total", "kind" => "broadcast", "result" => "ok")
                .increment(1);
            debug!(tracking_number = %tracking_number, "Broadcast triggered");
            Ok(BroadcastOutcome::Triggered)
        } else {
            let status = response.status().as_u16();
            metrics::counter!("notifications_total", "kind" => "broadcast", "result" => "failed")
                .increment(1);
            warn!(tracking_number = %tracking_number, status = %status, "Broadcast failed");
            Ok(BroadcastOutcome::Failed(status))
        }
    }

    async fn send_webhook(&self, payload: &WebhookPayload, url: &str) -> AppResult<()> {
        let tracking_number = payload.tracking_number.as_str();
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                error_logging::log_network_error(&e, "webhook", Some(url), Some(tracking_number));
                metrics::counter!("notifications_total", "kind" => "webhook", "result" => "error")
                    .increment(1);
                AppError::from(e)
            })?;

        if response.status() == StatusCode::OK {
            metrics::counter!("notifications_total", "kind" => "webhook", "result" => "ok")
                .increment(1);
            info!(tracking_number = %tracking_number, url = %url, "Webhook notification sent");
            Ok(())
        } else {
            let status = response.status().as_u16();
            metrics::counter!("notifications_total", "kind" => "webhook", "result" => "failed")
                .increment(1);
            warn!(tracking_number = %tracking_number, status = %status, "Webhook failed");
            Err(AppError::Network(format!("Webhook failed: HTTP {}", status)))
        }
    }

    async fn enqueue_email(&self, job: &EmailJob) -> AppResult<()> {
        let raw = serde_json::to_string(job)?;
        let length = self.store.rpush(keys::NOTIFICATION_QUEUE, &raw).await?;
        metrics::counter!("notifications_total", "kind" => "email", "result" => "queued")
            .increment(1);
        info!(
            tracking_number = %job.tracking_number,
            queue_length = %length,
            "Email notification queued"
        );
        Ok(())
    }

    async fn queue_length(&self) -> AppResult<u64> {
        self.store.llen(keys::NOTIFICATION_QUEUE).await
    }

    fn default_webhook_url(&self) -> &str {
        &self.websocket_server
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn shipment(email: Option<&str>, enabled: bool) -> Shipment {
        let now = Utc::now();
        Shipment {
            tracking_number: "TRK1".to_string(),
            status: "Pending".to_string(),
            checkpoints: String::new(),
            delivery_location: "Lagos, NG".to_string(),
            origin_location: "Lagos, NG".to_string(),
            recipient_email: email.map(str::to_string),
            webhook_url: None,
            email_notifications: enabled,
            created_at: now,
            last_updated: now,
        }
    }

    #[test]
    fn test_email_job_requires_recipient_and_opt_in() {
        assert!(EmailJob::for_shipment(&shipment(None, true), "bot@x.io").is_none());
        assert!(EmailJob::for_shipment(&shipment(Some("a@b.io"), false), "bot@x.io").is_none());
        let job = EmailJob::for_shipment(&shipment(Some("a@b.io"), true), "bot@x.io").unwrap();
        assert_eq!(job.recipient_email, "a@b.io");
        assert_eq!(job.from, "bot@x.io");
    }

    #[tokio::test]
    async fn test_enqueue_email_pushes_json() {
        let store = Arc::new(MemoryStore::new());
        let notifier =
            HttpNotifier::new("http://localhost:5000/", Duration::from_secs(5), store.clone())
                .unwrap();
        assert_eq!(notifier.default_webhook_url(), "http://localhost:5000");
        assert_eq!(
            notifier.broadcast_url("TRK1"),
            "http://localhost:5000/broadcast/TRK1"
        );

        let job = EmailJob::for_shipment(&shipment(Some("a@b.io"), true), "bot@x.io").unwrap();
        notifier.enqueue_email(&job).await.unwrap();
        notifier.enqueue_email(&job).await.unwrap();
        assert_eq!(notifier.queue_length().await.unwrap(), 2);
    }

    #[test]
    fn test_webhook_payload_shape() {
        let payload = WebhookPayload::for_shipment(&shipment(None, true));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["tracking_number"], "TRK1");
        assert_eq!(value["delivery_location"], "Lagos, NG");
        assert!(value["timestamp"].is_string());
    }
}
