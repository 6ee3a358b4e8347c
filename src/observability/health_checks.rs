//! Health check functionality module.
//!
//! This module provides:
//! - Database connectivity checks
//! - Key-value store checks
//! - Bot token validation checks
//! - The `/health/live` and `/health/ready` server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::store::KeyValueStore;

use super::metrics::record_health_check_metrics;

/// Dependencies checked by `/health/ready`. Absent ones are skipped.
#[derive(Clone, Default)]
pub struct ReadinessProbe {
    pub db_pool: Option<PgPool>,
    pub store: Option<Arc<dyn KeyValueStore>>,
    pub bot_token: Option<String>,
}

impl ReadinessProbe {
    /// Run every configured check, stopping at the first failure
    pub async fn check(&self) -> Result<()> {
        if let Some(pool) = &self.db_pool {
            timed_check("database", check_database_health(pool)).await?;
        }
        if let Some(store) = &self.store {
            timed_check("store", check_store_health(store.as_ref())).await?;
        }
        if let Some(token) = &self.bot_token {
            timed_check("bot_token", async { check_bot_token_health(token) }).await?;
        }
        Ok(())
    }
}

async fn timed_check(name: &str, check: impl Future<Output = Result<()>>) -> Result<()> {
    let started = Instant::now();
    let result = check.await;
    record_health_check_metrics(name, result.is_ok(), started.elapsed());
    result
}

/// Check database connectivity and basic query capability
pub async fn check_database_health(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database health check failed: {}", e))?;

    tracing::debug!("Database health check passed");
    Ok(())
}

/// Check the key-value store answers PING
pub async fn check_store_health(store: &dyn KeyValueStore) -> Result<()> {
    store
        .ping()
        .await
        .map_err(|e| anyhow::anyhow!("Store health check failed: {}", e))?;

    tracing::debug!("Store health check passed");
    Ok(())
}

/// Check Telegram bot token format
pub fn check_bot_token_health(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow::anyhow!("Bot token is empty"));
    }

    // Telegram bot tokens look like `<bot id>:<secret>`
    if !token.contains(':') {
        return Err(anyhow::anyhow!("Bot token format is invalid"));
    }

    tracing::debug!("Bot token health check passed");
    Ok(())
}

/// Serve liveness and readiness on `port` from a background task
pub async fn start_health_server(probe: ReadinessProbe, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Health server listening on {}", addr);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let probe = probe.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let probe = probe.clone();
                                async move {
                                    match (req.method(), req.uri().path()) {
                                        (&hyper::Method::GET, "/health/live") => {
                                            Ok::<_, std::convert::Infallible>(
                                                hyper::Response::new("OK".to_string()),
                                            )
                                        }
                                        (&hyper::Method::GET, "/health/ready") => {
                                            match probe.check().await {
                                                Ok(()) => Ok(hyper::Response::new("OK".to_string())),
                                                Err(e) => {
                                                    let mut response = hyper::Response::new(
                                                        format!("NOT READY: {}", e),
                                                    );
                                                    *response.status_mut() =
                                                        hyper::StatusCode::SERVICE_UNAVAILABLE;
                                                    Ok(response)
                                                }
                                            }
                                        }
                                        _ => {
                                            let mut response =
                                                hyper::Response::new("Not Found".to_string());
                                            *response.status_mut() = hyper::StatusCode::NOT_FOUND;
                                            Ok(response)
                                        }
                                    }
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            tracing::error!("Error serving health connection: {:?}", err);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Error accepting health connection: {}", e);
                }
            }
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_bot_token_format() {
        assert!(check_bot_token_health("123456:ABC-DEF").is_ok());
        assert!(check_bot_token_health("").is_err());
        assert!(check_bot_token_health("no-colon").is_err());
    }

    #[tokio::test]
    async fn test_probe_with_memory_store_is_ready() {
        let probe = ReadinessProbe {
            store: Some(Arc::new(MemoryStore::new())),
            bot_token: Some("1:token".to_string()),
            ..ReadinessProbe::default()
        };
        assert!(probe.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_reports_bad_token() {
        let probe = ReadinessProbe {
            bot_token: Some("broken".to_string()),
            ..ReadinessProbe::default()
        };
        let err = probe.check().await.unwrap_err();
        assert!(err.to_string().contains("Bot token"));
    }
}
