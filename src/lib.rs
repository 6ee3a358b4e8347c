//! # Shipment Admin Telegram Bot
//!
//! An admin-only Telegram bot for a shipment-tracking web application. Admins
//! create, inspect and edit shipments, pause and resume their delivery
//! simulations, and push notifications. Commands are rate limited per user
//! with a fixed window in the shared key-value store, and every mutation
//! invalidates the shipment's cached record.

pub mod bot;
pub mod cache;
pub mod config;
pub mod db;
pub mod dialogue;
pub mod errors;
pub mod notifications;
pub mod observability;
pub mod observability_config;
pub mod rate_limiter;
pub mod shipments;
pub mod simulation;
pub mod store;
pub mod validation;

// Re-export types for easier access
pub use cache::{CacheInvalidator, ShipmentCache, ShipmentDetails};
pub use errors::{AppError, AppResult};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use shipments::ShipmentService;
