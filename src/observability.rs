//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable format
//! - Optional OpenTelemetry span export
//! - Prometheus metrics on their own port
//! - Liveness and readiness endpoints

mod health_checks;
mod metrics;
mod tracing_mod;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::observability_config::ObservabilityConfig;

pub use health_checks::{
    check_bot_token_health, check_database_health, check_store_health, start_health_server,
    ReadinessProbe,
};
pub use metrics::{
    init_metrics, record_db_metrics, record_health_check_metrics, record_request_metrics,
    start_metrics_server,
};
pub use tracing_mod::{init_opentelemetry_tracing, init_tracing, telegram_span};

/// Initialize logging, the metrics recorder and span export
///
/// Call before anything else logs. The returned handle feeds
/// [`start_observability_servers`].
pub fn init_observability(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing(config)?;
    let metrics_handle = init_metrics()?;
    init_opentelemetry_tracing(config)?;

    tracing::info!(
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        "Observability stack initialized successfully"
    );
    Ok(metrics_handle)
}

/// Start the `/metrics` server and the health server once dependencies exist
pub async fn start_observability_servers(
    config: &ObservabilityConfig,
    metrics_handle: PrometheusHandle,
    probe: ReadinessProbe,
) -> Result<()> {
    start_metrics_server(metrics_handle, config.metrics_port).await?;
    start_health_server(probe, config.health_port).await?;
    Ok(())
}
