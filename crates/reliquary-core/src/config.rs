//! Configuration module
//!
//! Worker configuration is read from the environment (with `.env` support via
//! `dotenvy`). Every value has a default except `DATABASE_URL`.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::storage_types::StorageBackend;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const INGEST_QUEUE_NAME: &str = "ingest";
const TASK_QUEUE_MAX_WORKERS: usize = 4;
const TASK_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const TASK_QUEUE_DEFAULT_TIMEOUT_SECS: i32 = 3600;
const TASK_QUEUE_MAX_RETRIES: i32 = 3;
const STALE_TASK_REAP_INTERVAL_SECS: u64 = 60;
const STALE_TASK_GRACE_PERIOD_SECS: i64 = 300;

/// What the attachment job does with file sets it created before a later
/// upload in the same batch failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Keep them attached by parent reference and report their ids.
    #[default]
    Retain,
    /// Delete them, their bound content, and the uploaded-file back-references.
    Remove,
}

impl FromStr for OrphanPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retain" => Ok(OrphanPolicy::Retain),
            "remove" => Ok(OrphanPolicy::Remove),
            _ => Err(anyhow::anyhow!("Invalid orphan policy: {}", s)),
        }
    }
}

impl Display for OrphanPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OrphanPolicy::Retain => write!(f, "retain"),
            OrphanPolicy::Remove => write!(f, "remove"),
        }
    }
}

/// Settings shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// "text" or "json"
    pub log_format: String,
}

/// Attachment worker configuration
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    // Task queue configuration
    pub ingest_queue_name: String,
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    pub task_queue_default_timeout_seconds: i32,
    pub task_queue_max_retries: i32,
    /// Interval in seconds between runs of the stale task reaper. 0 = disabled.
    pub task_queue_stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to task timeout before reaping stale running tasks.
    pub task_queue_stale_task_grace_period_secs: i64,
    pub attach_orphan_policy: OrphanPolicy,
}

fn number_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let base = BaseConfig {
            environment,
            db_max_connections: number_or(&lookup, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS)?,
            db_timeout_seconds: number_or(&lookup, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS)?,
            log_format: lookup("LOG_FORMAT")
                .map(|s| s.trim().to_lowercase())
                .unwrap_or_else(|| "text".to_string()),
        };

        let storage_backend = match lookup("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::Local,
        };

        let attach_orphan_policy = match lookup("ATTACH_ORPHAN_POLICY") {
            Some(raw) => raw.parse()?,
            None => OrphanPolicy::default(),
        };

        let ingest_queue_name = lookup("INGEST_QUEUE_NAME")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| INGEST_QUEUE_NAME.to_string());

        Ok(WorkerConfig {
            base,
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            s3_bucket: lookup("S3_BUCKET"),
            s3_region: lookup("S3_REGION"),
            s3_endpoint: lookup("S3_ENDPOINT"),
            aws_region: lookup("AWS_REGION"),
            local_storage_path: lookup("LOCAL_STORAGE_PATH"),
            local_storage_base_url: lookup("LOCAL_STORAGE_BASE_URL"),
            ingest_queue_name,
            task_queue_max_workers: number_or(
                &lookup,
                "TASK_QUEUE_MAX_WORKERS",
                TASK_QUEUE_MAX_WORKERS,
            )?,
            task_queue_poll_interval_ms: number_or(
                &lookup,
                "TASK_QUEUE_POLL_INTERVAL_MS",
                TASK_QUEUE_POLL_INTERVAL_MS,
            )?,
            task_queue_default_timeout_seconds: number_or(
                &lookup,
                "TASK_QUEUE_DEFAULT_TIMEOUT_SECONDS",
                TASK_QUEUE_DEFAULT_TIMEOUT_SECS,
            )?,
            task_queue_max_retries: number_or(
                &lookup,
                "TASK_QUEUE_MAX_RETRIES",
                TASK_QUEUE_MAX_RETRIES,
            )?,
            task_queue_stale_task_reap_interval_secs: number_or(
                &lookup,
                "TASK_QUEUE_STALE_TASK_REAP_INTERVAL_SECS",
                STALE_TASK_REAP_INTERVAL_SECS,
            )?,
            task_queue_stale_task_grace_period_secs: number_or(
                &lookup,
                "TASK_QUEUE_STALE_TASK_GRACE_PERIOD_SECS",
                STALE_TASK_GRACE_PERIOD_SECS,
            )?,
            attach_orphan_policy,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.ingest_queue_name.is_empty() {
            return Err(anyhow::anyhow!("INGEST_QUEUE_NAME cannot be empty"));
        }
        if self.task_queue_max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS must be at least 1"));
        }
        if self.task_queue_max_retries < 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_RETRIES cannot be negative"));
        }
        if !matches!(self.base.log_format.as_str(), "text" | "json") {
            return Err(anyhow::anyhow!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                self.base.log_format
            ));
        }
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!("S3_BUCKET is required for the s3 backend"));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION is required for the s3 backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH is required for the local backend"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Application configuration (attachment worker).
#[derive(Clone, Debug)]
pub struct Config(pub Box<WorkerConfig>);

impl Config {
    fn as_worker(&self) -> &WorkerConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = WorkerConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_worker().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.as_worker().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn database_url(&self) -> &str {
        &self.as_worker().database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_worker().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_worker().base.db_timeout_seconds
    }

    pub fn log_format(&self) -> &str {
        &self.as_worker().base.log_format
    }

    pub fn environment(&self) -> &str {
        &self.as_worker().base.environment
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_worker().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_worker().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_worker().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_worker().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.as_worker().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_worker().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_worker().local_storage_base_url.as_deref()
    }

    pub fn ingest_queue_name(&self) -> &str {
        &self.as_worker().ingest_queue_name
    }

    pub fn task_queue_max_workers(&self) -> usize {
        self.as_worker().task_queue_max_workers
    }

    pub fn task_queue_poll_interval_ms(&self) -> u64 {
        self.as_worker().task_queue_poll_interval_ms
    }

    pub fn task_queue_default_timeout_seconds(&self) -> i32 {
        self.as_worker().task_queue_default_timeout_seconds
    }

    pub fn task_queue_max_retries(&self) -> i32 {
        self.as_worker().task_queue_max_retries
    }

    pub fn task_queue_stale_task_reap_interval_secs(&self) -> u64 {
        self.as_worker().task_queue_stale_task_reap_interval_secs
    }

    pub fn task_queue_stale_task_grace_period_secs(&self) -> i64 {
        self.as_worker().task_queue_stale_task_grace_period_secs
    }

    pub fn attach_orphan_policy(&self) -> OrphanPolicy {
        self.as_worker().attach_orphan_policy
    }
}
