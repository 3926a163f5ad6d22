//! Attachment worker
//!
//! Claims `attach_files_to_work` tasks from the ingest queue and runs them
//! until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{Arc, Weak};

use reliquary_cli::{connect_database, init_logging, shutdown_signal};
use reliquary_core::{Config, OrphanPolicy};
use reliquary_db::{
    run_migrations, ActivityRepository, FileSetRepository, TaskRepository,
    UploadedFileRepository, UserRepository, WorkRepository,
};
use reliquary_infra::shutdown_telemetry;
use reliquary_storage::create_storage;
use reliquary_worker::{
    ActivityStreamCallback, AttachFilesToWork, AttachServices, AttachmentWorkerContext,
    TaskHandlerContext, TaskQueue, TaskQueueConfig,
};

#[derive(Parser)]
#[command(name = "reliquary_worker")]
#[command(about = "Run the file attachment worker", long_about = None)]
struct Args {
    /// Queue to consume (overrides INGEST_QUEUE_NAME)
    #[arg(long)]
    queue: Option<String>,

    /// Maximum concurrent jobs (overrides TASK_QUEUE_MAX_WORKERS)
    #[arg(long)]
    workers: Option<usize>,

    /// What to do with file sets left behind by a failed job: retain or remove
    #[arg(long)]
    orphan_policy: Option<OrphanPolicy>,

    /// Skip applying database migrations on startup
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(queue) = args.queue {
        config.0.ingest_queue_name = queue;
    }
    if let Some(workers) = args.workers {
        config.0.task_queue_max_workers = workers;
    }
    if let Some(policy) = args.orphan_policy {
        config.0.attach_orphan_policy = policy;
    }
    config.validate()?;

    init_logging(&config)?;
    tracing::info!(
        environment = config.environment(),
        queue = config.ingest_queue_name(),
        orphan_policy = %config.attach_orphan_policy(),
        "Starting attachment worker"
    );

    let pool = connect_database(&config).await?;
    if !args.skip_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;
    }

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage")?;
    tracing::info!(backend = ?storage.backend_type(), "Storage initialized");

    let services = AttachServices {
        users: Arc::new(UserRepository::new(pool.clone())),
        uploads: Arc::new(UploadedFileRepository::new(pool.clone())),
        file_sets: Arc::new(FileSetRepository::new(pool.clone())),
        works: Arc::new(WorkRepository::new(pool.clone())),
        storage,
        callback: Arc::new(ActivityStreamCallback::new(Arc::new(ActivityRepository::new(
            pool.clone(),
        )))),
    };
    let job = AttachFilesToWork::new(services, config.attach_orphan_policy());
    let context: Arc<dyn TaskHandlerContext> = Arc::new(AttachmentWorkerContext::new(job));
    let weak: Weak<dyn TaskHandlerContext> = Arc::downgrade(&context);

    let queue = TaskQueue::new(
        TaskRepository::new(pool.clone()),
        TaskQueueConfig::from_config(&config),
        weak,
        Some(pool.clone()),
    );
    tracing::info!(queue = queue.queue_name(), "Worker ready");

    shutdown_signal().await;

    tracing::info!("Shutting down attachment worker...");
    queue.shutdown().await;
    pool.close().await;
    shutdown_telemetry().await;

    Ok(())
}
