//! Shared setup for the Reliquary binaries

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use reliquary_core::Config;
use reliquary_infra::{init_telemetry, LogFormat};

/// Initialize tracing using the configured log format.
pub fn init_logging(config: &Config) -> Result<()> {
    let format: LogFormat = config.log_format().parse()?;
    init_telemetry(format).map_err(|e| anyhow!("Failed to initialize tracing: {}", e))
}

/// Connect to PostgreSQL with the configured pool limits.
pub async fn connect_database(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.database_url())
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections(),
        "Database connected successfully"
    );
    Ok(pool)
}

/// Parse a `key=value` work attribute.
///
/// The value is read as JSON when it is a JSON literal (`true`, `3`,
/// `"quoted"`, `{...}`) and kept as a plain string otherwise.
pub fn parse_attribute(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("Attribute key cannot be empty in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
///
/// # Panics
/// Panics if a signal handler cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }
}
