//! Enqueue an `attach_files_to_work` task
//!
//! ```text
//! attach_files --work-id <UUID> --upload <UUID> --upload <UUID> --attr visibility=open
//! ```

use anyhow::Result;
use clap::Parser;
use serde_json::{Map, Value};
use uuid::Uuid;

use reliquary_cli::{connect_database, init_logging, parse_attribute};
use reliquary_core::models::AttachFilesToWorkPayload;
use reliquary_core::Config;
use reliquary_db::TaskRepository;
use reliquary_worker::{enqueue_attach_files, TaskQueue, TaskQueueConfig};

#[derive(Parser)]
#[command(name = "attach_files")]
#[command(about = "Queue uploaded files for attachment to a work", long_about = None)]
struct Args {
    /// Work receiving the files
    #[arg(long)]
    work_id: Uuid,

    /// Uploaded file id, in member order (repeatable)
    #[arg(long = "upload", required = true)]
    uploads: Vec<Uuid>,

    /// Work attribute as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attribute)]
    attributes: Vec<(String, Value)>,

    /// Target queue (defaults to INGEST_QUEUE_NAME)
    #[arg(long)]
    queue: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_env()?;
    config.validate()?;
    init_logging(&config)?;

    let pool = connect_database(&config).await?;
    let queue = TaskQueue::new_no_worker(
        TaskRepository::new(pool.clone()),
        TaskQueueConfig::from_config(&config),
    );
    let queue_name = args
        .queue
        .unwrap_or_else(|| queue.queue_name().to_string());

    let work_attributes: Map<String, Value> = args.attributes.into_iter().collect();
    let payload = AttachFilesToWorkPayload::new(args.work_id, &args.uploads, work_attributes);

    let task_id = enqueue_attach_files(&queue, &queue_name, &payload).await?;
    println!("{}", task_id);

    pool.close().await;
    Ok(())
}
