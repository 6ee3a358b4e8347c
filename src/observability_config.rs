//! # Observability Configuration
//!
//! Environment-specific settings for logging, metrics export and trace export.

use std::env;

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// OTLP endpoint for trace export
    pub otlp_endpoint: Option<String>,
    /// Prometheus metrics endpoint port
    pub metrics_port: u16,
    /// Liveness/readiness endpoint port
    pub health_port: u16,
    /// Log level for this crate's targets
    pub log_level: String,
    /// `pretty` or `json`; development defaults to pretty
    pub log_format: Option<String>,
    /// Whether to enable trace sampling
    pub enable_trace_sampling: bool,
    /// Trace sampling ratio (0.0-1.0)
    pub trace_sampling_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            otlp_endpoint: None,
            metrics_port: 9090,
            health_port: 8080,
            log_level: "info".to_string(),
            log_format: None,
            enable_trace_sampling: false,
            trace_sampling_ratio: 1.0,
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup; unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            environment: lookup("ENVIRONMENT").unwrap_or(defaults.environment),
            otlp_endpoint: lookup("OTLP_ENDPOINT").filter(|e| !e.trim().is_empty()),
            metrics_port: lookup("METRICS_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_port),
            health_port: lookup("HEALTH_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.health_port),
            log_level: lookup("OBSERVABILITY_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT"),
            enable_trace_sampling: lookup("ENABLE_TRACE_SAMPLING")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_trace_sampling),
            trace_sampling_ratio: lookup("TRACE_SAMPLING_RATIO")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.trace_sampling_ratio),
        }
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Pretty output when asked for explicitly, or in development unless JSON was requested.
    pub fn use_pretty_logs(&self) -> bool {
        match self.log_format.as_deref() {
            Some("pretty") => true,
            Some("json") => false,
            _ => self.is_development(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Invalid OTLP endpoint format: {}", endpoint));
            }
        }

        if !(0.0..=1.0).contains(&self.trace_sampling_ratio) {
            return Err(format!(
                "Invalid trace sampling ratio: {}",
                self.trace_sampling_ratio
            ));
        }

        if self.metrics_port == 0 || self.health_port == 0 {
            return Err("Metrics and health ports must be non-zero".to_string());
        }

        if self.metrics_port == self.health_port {
            return Err("Health port and metrics port cannot be the same".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.health_port, 8080);
        assert!(config.use_pretty_logs());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ObservabilityConfig::default();

        config.otlp_endpoint = Some("invalid-endpoint".to_string());
        assert!(config.validate().is_err());

        config.otlp_endpoint = None;
        config.trace_sampling_ratio = 1.5;
        assert!(config.validate().is_err());

        config.trace_sampling_ratio = 1.0;
        config.health_port = config.metrics_port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_selection() {
        let lookup = |key: &str| match key {
            "ENVIRONMENT" => Some("production".to_string()),
            "METRICS_PORT" => Some("not-a-port".to_string()),
            _ => None,
        };
        let config = ObservabilityConfig::from_lookup(&lookup);
        assert!(config.is_production());
        assert!(!config.use_pretty_logs());
        assert_eq!(config.metrics_port, 9090);

        let lookup = |key: &str| match key {
            "ENVIRONMENT" => Some("production".to_string()),
            "LOG_FORMAT" => Some("pretty".to_string()),
            _ => None,
        };
        assert!(ObservabilityConfig::from_lookup(&lookup).use_pretty_logs());
    }
}
