use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::COMPLETED_STATUSES;
use crate::errors::{AppError, AppResult};

/// Shipments shown per menu page
pub const PAGE_SIZE: u32 = 5;

/// Represents a shipment in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub tracking_number: String,
    pub status: String,
    /// Visited waypoints joined with `;`
    pub checkpoints: String,
    pub delivery_location: String,
    pub origin_location: String,
    pub recipient_email: Option<String>,
    pub webhook_url: Option<String>,
    pub email_notifications: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Shipment {
    pub fn is_completed(&self) -> bool {
        COMPLETED_STATUSES.contains(&self.status.as_str())
    }

    fn from_row(row: &PgRow) -> Self {
        Self {
            tracking_number: row.get("tracking_number"),
            status: row.get("status"),
            checkpoints: row.get("checkpoints"),
            delivery_location: row.get("delivery_location"),
            origin_location: row.get("origin_location"),
            recipient_email: row.get("recipient_email"),
            webhook_url: row.get("webhook_url"),
            email_notifications: row.get("email_notifications"),
            created_at: row.get("created_at"),
            last_updated: row.get("last_updated"),
        }
    }
}

/// One page of tracking numbers plus the size of the whole result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipmentPage {
    pub tracking_numbers: Vec<String>,
    pub total: u64,
}

/// Aggregate counts for `/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShipmentCounts {
    pub total: u64,
    pub active: u64,
}

const SHIPMENT_COLUMNS: &str = "tracking_number, status, checkpoints, delivery_location, origin_location, \
     recipient_email, webhook_url, email_notifications, created_at, last_updated";

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS shipments (
            tracking_number VARCHAR(50) PRIMARY KEY,
            status VARCHAR(32) NOT NULL,
            checkpoints TEXT NOT NULL DEFAULT '',
            delivery_location VARCHAR(100) NOT NULL,
            origin_location VARCHAR(100) NOT NULL,
            recipient_email VARCHAR(120),
            webhook_url VARCHAR(200),
            email_notifications BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_updated TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create shipments table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS shipments_status_idx ON shipments(status)")
        .execute(pool)
        .await
        .context("Failed to create shipments status index")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS shipments_delivery_location_idx ON shipments(delivery_location)",
    )
    .execute(pool)
    .await
    .context("Failed to create shipments delivery_location index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Read a shipment by tracking number
pub async fn read_shipment(pool: &PgPool, tracking_number: &str) -> Result<Option<Shipment>> {
    debug!(tracking_number = %tracking_number, "Reading shipment");

    let row = sqlx::query(&format!(
        "SELECT {} FROM shipments WHERE tracking_number = $1",
        SHIPMENT_COLUMNS
    ))
    .bind(tracking_number)
    .fetch_optional(pool)
    .await
    .context("Failed to read shipment")?;

    Ok(row.as_ref().map(Shipment::from_row))
}

/// Insert a shipment or overwrite every mutable column of an existing one.
/// `created_at` of an existing row is kept.
pub async fn upsert_shipment(pool: &PgPool, shipment: &Shipment) -> Result<Shipment> {
    debug!(tracking_number = %shipment.tracking_number, status = %shipment.status, "Saving shipment");

    let row = sqlx::query(&format!(
        "INSERT INTO shipments ({columns})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (tracking_number) DO UPDATE SET
            status = EXCLUDED.status,
            checkpoints = EXCLUDED.checkpoints,
            delivery_location = EXCLUDED.delivery_location,
            origin_location = EXCLUDED.origin_location,
            recipient_email = EXCLUDED.recipient_email,
            webhook_url = EXCLUDED.webhook_url,
            email_notifications = EXCLUDED.email_notifications,
            last_updated = EXCLUDED.last_updated
         RETURNING {columns}",
        columns = SHIPMENT_COLUMNS
    ))
    .bind(&shipment.tracking_number)
    .bind(&shipment.status)
    .bind(&shipment.checkpoints)
    .bind(&shipment.delivery_location)
    .bind(&shipment.origin_location)
    .bind(&shipment.recipient_email)
    .bind(&shipment.webhook_url)
    .bind(shipment.email_notifications)
    .bind(shipment.created_at)
    .bind(shipment.last_updated)
    .fetch_one(pool)
    .await
    .context("Failed to save shipment")?;

    Ok(Shipment::from_row(&row))
}

/// Delete a shipment from the database
pub async fn delete_shipment(pool: &PgPool, tracking_number: &str) -> Result<bool> {
    debug!(tracking_number = %tracking_number, "Deleting shipment");

    let result = sqlx::query("DELETE FROM shipments WHERE tracking_number = $1")
        .bind(tracking_number)
        .execute(pool)
        .await
        .context("Failed to delete shipment")?;

    if result.rows_affected() > 0 {
        debug!(tracking_number = %tracking_number, "Shipment deleted successfully");
        Ok(true)
    } else {
        info!("No shipment found with tracking number: {tracking_number}");
        Ok(false)
    }
}

/// Set or clear a shipment's webhook URL
pub async fn update_webhook_url(
    pool: &PgPool,
    tracking_number: &str,
    webhook_url: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE shipments SET webhook_url = $1, last_updated = NOW() WHERE tracking_number = $2",
    )
    .bind(webhook_url)
    .bind(tracking_number)
    .execute(pool)
    .await
    .context("Failed to update webhook URL")?;

    Ok(result.rows_affected() > 0)
}

/// Flip `email_notifications`; returns the new value, `None` if the shipment is missing
pub async fn toggle_email_notifications(pool: &PgPool, tracking_number: &str) -> Result<Option<bool>> {
    let row = sqlx::query(
        "UPDATE shipments SET email_notifications = NOT email_notifications, last_updated = NOW()
         WHERE tracking_number = $1 RETURNING email_notifications",
    )
    .bind(tracking_number)
    .fetch_optional(pool)
    .await
    .context("Failed to toggle email notifications")?;

    Ok(row.map(|row| row.get(0)))
}

fn offset(page: u32) -> i64 {
    i64::from(page.saturating_sub(1)) * i64::from(PAGE_SIZE)
}

/// All shipments ordered by tracking number
pub async fn list_shipments(pool: &PgPool, page: u32) -> Result<ShipmentPage> {
    let rows = sqlx::query(
        "SELECT tracking_number FROM shipments ORDER BY tracking_number OFFSET $1 LIMIT $2",
    )
    .bind(offset(page))
    .bind(i64::from(PAGE_SIZE))
    .fetch_all(pool)
    .await
    .context("Failed to list shipments")?;

    let total: i64 = sqlx::query("SELECT COUNT(*) FROM shipments")
        .fetch_one(pool)
        .await
        .context("Failed to count shipments")?
        .get(0);

    Ok(ShipmentPage {
        tracking_numbers: rows.iter().map(|r| r.get(0)).collect(),
        total: total.max(0) as u64,
    })
}

/// Shipments whose status is not completed
pub async fn list_active_shipments(pool: &PgPool, page: u32) -> Result<ShipmentPage> {
    let completed = completed_statuses();
    let rows = sqlx::query(
        "SELECT tracking_number FROM shipments WHERE status <> ALL($1)
         ORDER BY tracking_number OFFSET $2 LIMIT $3",
    )
    .bind(&completed)
    .bind(offset(page))
    .bind(i64::from(PAGE_SIZE))
    .fetch_all(pool)
    .await
    .context("Failed to list active shipments")?;

    let total: i64 = sqlx::query("SELECT COUNT(*) FROM shipments WHERE status <> ALL($1)")
        .bind(&completed)
        .fetch_one(pool)
        .await
        .context("Failed to count active shipments")?
        .get(0);

    Ok(ShipmentPage {
        tracking_numbers: rows.iter().map(|r| r.get(0)).collect(),
        total: total.max(0) as u64,
    })
}

/// Case-insensitive substring search over tracking number, status and delivery location
pub async fn search_shipments(pool: &PgPool, query: &str, page: u32) -> Result<ShipmentPage> {
    let pattern = format!("%{}%", escape_like(query));
    let filter = "tracking_number ILIKE $1 OR status ILIKE $1 OR delivery_location ILIKE $1";

    let rows = sqlx::query(&format!(
        "SELECT tracking_number FROM shipments WHERE {} ORDER BY tracking_number OFFSET $2 LIMIT $3",
        filter
    ))
    .bind(&pattern)
    .bind(offset(page))
    .bind(i64::from(PAGE_SIZE))
    .fetch_all(pool)
    .await
    .context("Failed to search shipments")?;

    let total: i64 = sqlx::query(&format!("SELECT COUNT(*) FROM shipments WHERE {}", filter))
        .bind(&pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count search results")?
        .get(0);

    Ok(ShipmentPage {
        tracking_numbers: rows.iter().map(|r| r.get(0)).collect(),
        total: total.max(0) as u64,
    })
}

/// Total and active shipment counts
pub async fn count_shipments(pool: &PgPool) -> Result<ShipmentCounts> {
    let row = sqlx::query(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE status <> ALL($1)) FROM shipments",
    )
    .bind(completed_statuses())
    .fetch_one(pool)
    .await
    .context("Failed to count shipments")?;

    let total: i64 = row.get(0);
    let active: i64 = row.get(1);
    Ok(ShipmentCounts {
        total: total.max(0) as u64,
        active: active.max(0) as u64,
    })
}

fn completed_statuses() -> Vec<String> {
    COMPLETED_STATUSES.iter().map(|s| s.to_string()).collect()
}

/// Escape LIKE wildcards so user input matches literally
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Persistence operations the bot needs for shipments.
#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    async fn find(&self, tracking_number: &str) -> AppResult<Option<Shipment>>;
    async fn exists(&self, tracking_number: &str) -> AppResult<bool> {
        Ok(self.find(tracking_number).await?.is_some())
    }
    async fn save(&self, shipment: &Shipment) -> AppResult<Shipment>;
    async fn delete(&self, tracking_number: &str) -> AppResult<bool>;
    async fn set_webhook(&self, tracking_number: &str, webhook_url: Option<&str>) -> AppResult<bool>;
    async fn toggle_email(&self, tracking_number: &str) -> AppResult<Option<bool>>;
    async fn list(&self, page: u32) -> AppResult<ShipmentPage>;
    async fn list_active(&self, page: u32) -> AppResult<ShipmentPage>;
    async fn search(&self, query: &str, page: u32) -> AppResult<ShipmentPage>;
    async fn counts(&self) -> AppResult<ShipmentCounts>;
}

/// PostgreSQL-backed [`ShipmentRepository`]
#[derive(Clone)]
pub struct PgShipmentRepository {
    pool: PgPool,
}

impl PgShipmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn timed<T>(operation: &'static str, started: Instant, result: Result<T>) -> AppResult<T> {
    crate::observability::record_db_metrics(operation, started.elapsed());
    result.map_err(|e| {
        crate::errors::error_logging::log_database_error(&e, operation, None, None);
        AppError::Database(format!("{:#}", e))
    })
}

#[async_trait]
impl ShipmentRepository for PgShipmentRepository {
    async fn find(&self, tracking_number: &str) -> AppResult<Option<Shipment>> {
        let started = Instant::now();
        timed("find_shipment", started, read_shipment(&self.pool, tracking_number).await)
    }

    async fn save(&self, shipment: &Shipment) -> AppResult<Shipment> {
        let started = Instant::now();
        timed("save_shipment", started, upsert_shipment(&self.pool, shipment).await)
    }

    async fn delete(&self, tracking_number: &str) -> AppResult<bool> {
        let started = Instant::now();
        timed("delete_shipment", started, delete_shipment(&self.pool, tracking_number).await)
    }

    async fn set_webhook(&self, tracking_number: &str, webhook_url: Option<&str>) -> AppResult<bool> {
        let started = Instant::now();
        timed(
            "set_webhook",
            started,
            update_webhook_url(&self.pool, tracking_number, webhook_url).await,
        )
    }

    async fn toggle_email(&self, tracking_number: &str) -> AppResult<Option<bool>> {
        let started = Instant::now();
        timed(
            "toggle_email",
            started,
            toggle_email_notifications(&self.pool, tracking_number).await,
        )
    }

    async fn list(&self, page: u32) -> AppResult<ShipmentPage> {
        let started = Instant::now();
        timed("list_shipments", started, list_shipments(&self.pool, page).await)
    }

    async fn list_active(&self, page: u32) -> AppResult<ShipmentPage> {
        let started = Instant::now();
        timed("list_active", started, list_active_shipments(&self.pool, page).await)
    }

    async fn search(&self, query: &str, page: u32) -> AppResult<ShipmentPage> {
        let started = Instant::now();
        timed("search_shipments", started, search_shipments(&self.pool, query, page).await)
    }

    async fn counts(&self) -> AppResult<ShipmentCounts> {
        let started = Instant::now();
        timed("count_shipments", started, count_shipments(&self.pool).await)
    }
}
