//! # Unified Application Configuration
//!
//! Consolidates every setting the admin bot needs into one structured
//! configuration object. Values come from environment variables (a `.env`
//! file is loaded by `main` first), each section carries its own defaults
//! and validation.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;

/// Shipment states that end a simulation.
pub const COMPLETED_STATUSES: [&str; 2] = ["Delivered", "Returned"];

const DEFAULT_VALID_STATUSES: &str = "Pending,In_Transit,Out_for_Delivery,Delivered,Returned,Delayed";
const DEFAULT_ROUTE_TEMPLATES: &str = r#"{"Lagos, NG": ["Lagos, NG"]}"#;

/// Bot-specific configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Telegram bot token
    pub token: String,
    /// HTTP client timeout in seconds
    pub http_timeout_secs: u64,
    /// Public address Telegram would deliver updates to in webhook mode
    pub webhook_url: String,
    /// Base URL of the web app's websocket server (broadcast trigger)
    pub websocket_server: String,
    /// Timeout for broadcast and webhook calls in seconds
    pub notification_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            http_timeout_secs: 30,
            webhook_url: "https://signment.onrender.com/telegram/webhook".to_string(),
            websocket_server: "https://signment.onrender.com".to_string(),
            notification_timeout_secs: 5,
        }
    }
}

impl BotConfig {
    /// Validate bot configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.token.trim().is_empty() {
            return Err(AppError::Config("Bot token cannot be empty".to_string()));
        }

        let parts: Vec<&str> = self.token.split(':').collect();
        if parts.len() != 2 {
            return Err(AppError::Config(
                "Bot token format is invalid. Expected format: 'bot_id:bot_token'".to_string(),
            ));
        }

        if parts[0].parse::<u64>().is_err() {
            return Err(AppError::Config("Bot token bot ID must be numeric".to_string()));
        }

        if parts[1].len() < 20 {
            return Err(AppError::Config(
                "Bot token appears to be too short. Please verify it's a valid token".to_string(),
            ));
        }

        if self.http_timeout_secs == 0 || self.http_timeout_secs > 300 {
            return Err(AppError::Config(
                "HTTP timeout must be between 1 and 300 seconds".to_string(),
            ));
        }

        if self.notification_timeout_secs == 0 || self.notification_timeout_secs > 60 {
            return Err(AppError::Config(
                "Notification timeout must be between 1 and 60 seconds".to_string(),
            ));
        }

        for (name, url) in [
            ("WEBHOOK_URL", &self.webhook_url),
            ("WEBSOCKET_SERVER", &self.websocket_server),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "{} must be an http(s) URL, got '{}'",
                    name, url
                )));
            }
        }

        Ok(())
    }
}

/// Database configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// Validate database configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.url.trim().is_empty() {
            return Err(AppError::Config("Database URL cannot be empty".to_string()));
        }

        if !self.url.starts_with("postgresql://") && !self.url.starts_with("postgres://") {
            return Err(AppError::Config(
                "Database URL must start with 'postgresql://' or 'postgres://'".to_string(),
            ));
        }

        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(AppError::Config(
                "Max connections must be between 1 and 100".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(AppError::Config("Connect timeout cannot be 0".to_string()));
        }

        Ok(())
    }
}

/// Shared key-value store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL; `None` selects the in-process store
    pub redis_url: Option<String>,
}

impl StoreConfig {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(url) = &self.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(AppError::Config(
                    "REDIS_URL must start with 'redis://' or 'rediss://'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Fixed-window rate limiting for inbound commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_secs: u64,
    /// Requests allowed per user per window
    pub max_requests: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 10,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.window_secs == 0 {
            return Err(AppError::Config("RATE_LIMIT_WINDOW cannot be 0".to_string()));
        }
        if self.max_requests == 0 {
            return Err(AppError::Config("RATE_LIMIT_MAX cannot be 0".to_string()));
        }
        Ok(())
    }
}

/// Who may use the bot and which shipment values are acceptable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Telegram user ids allowed to run privileged commands
    pub allowed_admins: HashSet<i64>,
    /// Allowed shipment statuses, in display order
    pub valid_statuses: Vec<String>,
    /// Route name to ordered waypoints
    pub route_templates: BTreeMap<String, Vec<String>>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            allowed_admins: HashSet::new(),
            valid_statuses: parse_list(DEFAULT_VALID_STATUSES),
            route_templates: BTreeMap::from([(
                "Lagos, NG".to_string(),
                vec!["Lagos, NG".to_string()],
            )]),
        }
    }
}

impl AdminConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.valid_statuses.is_empty() {
            return Err(AppError::Config("VALID_STATUSES cannot be empty".to_string()));
        }
        if self.route_templates.is_empty() {
            return Err(AppError::Config("ROUTE_TEMPLATES cannot be empty".to_string()));
        }
        if let Some((name, _)) = self.route_templates.iter().find(|(_, w)| w.is_empty()) {
            return Err(AppError::Config(format!(
                "Route template '{}' has no waypoints",
                name
            )));
        }
        Ok(())
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.allowed_admins.contains(&user_id)
    }
}

/// Outbound mail settings, carried on queued email jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub pass: String,
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            user: String::new(),
            pass: String::new(),
            from: "no-reply@example.com".to_string(),
        }
    }
}

impl SmtpConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("SMTP_HOST cannot be empty".to_string()));
        }
        if self.port == 0 {
            return Err(AppError::Config("SMTP_PORT cannot be 0".to_string()));
        }
        if !self.from.contains('@') {
            return Err(AppError::Config(format!(
                "SMTP_FROM '{}' is not an email address",
                self.from
            )));
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub admin: AdminConfig,
    pub smtp: SmtpConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.bot.token = lookup("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            AppError::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        config.bot.http_timeout_secs = parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30)?;
        config.bot.notification_timeout_secs = parse_or(&lookup, "NOTIFICATION_TIMEOUT_SECS", 5)?;
        if let Some(url) = lookup("WEBHOOK_URL") {
            config.bot.webhook_url = url;
        }
        if let Some(url) = lookup("WEBSOCKET_SERVER") {
            config.bot.websocket_server = url.trim_end_matches('/').to_string();
        }

        config.database.url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable is required".to_string())
        })?;
        config.database.max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        config.database.connect_timeout_secs =
            parse_or(&lookup, "DATABASE_CONNECT_TIMEOUT_SECS", 30)?;

        config.store.redis_url = lookup("REDIS_URL").filter(|url| !url.trim().is_empty());

        config.rate_limit.window_secs = parse_or(&lookup, "RATE_LIMIT_WINDOW", 60)?;
        config.rate_limit.max_requests = parse_or(&lookup, "RATE_LIMIT_MAX", 10)?;

        if let Some(raw) = lookup("ALLOWED_ADMINS") {
            config.admin.allowed_admins = parse_admins(&raw)?;
        }
        if let Some(raw) = lookup("VALID_STATUSES") {
            config.admin.valid_statuses = parse_list(&raw);
        }
        let templates = lookup("ROUTE_TEMPLATES").unwrap_or_else(|| DEFAULT_ROUTE_TEMPLATES.to_string());
        config.admin.route_templates = serde_json::from_str(&templates).map_err(|e| {
            AppError::Config(format!("ROUTE_TEMPLATES must be a JSON object of lists: {}", e))
        })?;

        if let Some(host) = lookup("SMTP_HOST") {
            config.smtp.host = host;
        }
        config.smtp.port = parse_or(&lookup, "SMTP_PORT", 587)?;
        config.smtp.user = lookup("SMTP_USER").unwrap_or_default();
        config.smtp.pass = lookup("SMTP_PASS").unwrap_or_default();
        if let Some(from) = lookup("SMTP_FROM") {
            config.smtp.from = from;
        }

        config.observability = ObservabilityConfig::from_lookup(&lookup);

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.bot.validate()?;
        self.database.validate()?;
        self.store.validate()?;
        self.rate_limit.validate()?;
        self.admin.validate()?;
        self.smtp.validate()?;
        self.observability
            .validate()
            .map_err(AppError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: bot_token=[REDACTED], db_url=[REDACTED], store={}, admins={}, statuses={}, routes={}, rate_limit={}/{}s, smtp={}:{}",
            if self.store.redis_url.is_some() { "redis" } else { "memory" },
            self.admin.allowed_admins.len(),
            self.admin.valid_statuses.len(),
            self.admin.route_templates.len(),
            self.rate_limit.max_requests,
            self.rate_limit.window_secs,
            self.smtp.host,
            self.smtp.port,
        )
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} must be a valid number", key))),
        None => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_admins(raw: &str) -> AppResult<HashSet<i64>> {
    parse_list(raw)
        .into_iter()
        .map(|id| {
            id.parse::<i64>().map_err(|_| {
                AppError::Config(format!("ALLOWED_ADMINS entry '{}' is not a user id", id))
            })
        })
        .collect()
}
