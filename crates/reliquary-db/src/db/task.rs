use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use reliquary_core::models::{Task, TaskStatus, TaskType};

/// Channel for PostgreSQL LISTEN/NOTIFY when a task is created. The payload is the queue name.
pub const TASK_NOTIFY_CHANNEL: &str = "reliquary_new_task";

const TASK_COLUMNS: &str = "id, queue, task_type, status, priority, payload, result, scheduled_at, \
     started_at, completed_at, retry_count, max_retries, timeout_seconds, created_at, updated_at";

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a new task on `queue` and notify listening workers
    #[tracing::instrument(skip(self, payload), fields(db.table = "tasks", db.operation = "insert"))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        queue: &str,
        task_type: TaskType,
        payload: serde_json::Value,
        priority: i32,
        scheduled_at: Option<DateTime<Utc>>,
        max_retries: Option<i32>,
        timeout_seconds: Option<i32>,
    ) -> Result<Task> {
        let scheduled_at = scheduled_at.unwrap_or_else(Utc::now);
        let max_retries = max_retries.unwrap_or(3);
        let status = if scheduled_at > Utc::now() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for task creation")?;

        let task: Task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            INSERT INTO tasks (
                queue, task_type, status, priority, payload, scheduled_at,
                max_retries, timeout_seconds
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(queue)
        .bind(task_type.to_string())
        .bind(status)
        .bind(priority)
        .bind(payload)
        .bind(scheduled_at)
        .bind(max_retries)
        .bind(timeout_seconds)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                queue = %queue,
                task_type = %task_type,
                "Failed to insert task into database"
            );
            anyhow::anyhow!("Failed to insert task into database: {}", e)
        })?;

        // Non-fatal: workers still find the task by polling
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(TASK_NOTIFY_CHANNEL)
            .bind(queue)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                task_id = %task.id,
                "Failed to send pg_notify for new task, workers will discover task via polling"
            );
        }

        tx.commit()
            .await
            .context("Failed to commit transaction for task creation")?;

        tracing::info!(
            task_id = %task.id,
            queue = %queue,
            task_type = %task_type,
            priority = priority,
            "Task created"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "select"))]
    pub async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch task")?;

        Ok(task)
    }

    /// Atomically claim the next runnable task on `queue`.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the same task.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn claim_next_task(&self, queue: &str) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'running',
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = (
                SELECT id
                FROM tasks
                WHERE queue = $1
                    AND status IN ('pending', 'scheduled')
                    AND scheduled_at <= NOW()
                ORDER BY priority DESC, scheduled_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(queue)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to claim next task")?;

        if let Some(ref task) = task {
            tracing::debug!(
                task_id = %task.id,
                queue = %queue,
                task_type = %task.task_type,
                "Task claimed"
            );
        }

        Ok(task)
    }

    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn update_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            "UPDATE tasks SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .context("Failed to update task status")?;

        Ok(task)
    }

    #[tracing::instrument(skip(self, result), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn mark_completed(&self, task_id: Uuid, result: serde_json::Value) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'completed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as completed")?;

        tracing::info!(
            task_id = %task_id,
            queue = %task.queue,
            task_type = %task.task_type,
            "Task completed"
        );

        Ok(task)
    }

    #[tracing::instrument(skip(self, error), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn mark_failed(&self, task_id: Uuid, error: serde_json::Value) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'failed',
                result = $2,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark task as failed")?;

        tracing::error!(
            task_id = %task_id,
            queue = %task.queue,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            "Task failed"
        );

        Ok(task)
    }

    /// Put a failed task back on its queue after `backoff_seconds`
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn schedule_retry(&self, task_id: Uuid, backoff_seconds: u64) -> Result<Task> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'scheduled',
                retry_count = retry_count + 1,
                scheduled_at = NOW() + ($2 * interval '1 second'),
                started_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(backoff_seconds as i64)
        .fetch_one(&self.pool)
        .await
        .context("Failed to schedule task retry")?;

        tracing::info!(
            task_id = %task_id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            scheduled_at = %task.scheduled_at,
            "Task retry scheduled"
        );

        Ok(task)
    }

    /// Requeue (or fail, once out of retries) tasks on `queue` that have been
    /// running longer than their timeout plus `grace_period_secs`, e.g. after a
    /// worker crash. Returns the number of tasks touched.
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn reap_stale_running_tasks(&self, queue: &str, grace_period_secs: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = CASE WHEN retry_count < max_retries
                              THEN 'pending'::task_status
                              ELSE 'failed'::task_status END,
                retry_count = CASE WHEN retry_count < max_retries
                                   THEN retry_count + 1
                                   ELSE retry_count END,
                result = CASE WHEN retry_count < max_retries
                              THEN result
                              ELSE jsonb_build_object('error', 'Task abandoned by worker', 'reaped', true) END,
                completed_at = CASE WHEN retry_count < max_retries THEN NULL ELSE NOW() END,
                started_at = NULL,
                updated_at = NOW()
            WHERE queue = $1
                AND status = 'running'
                AND started_at < NOW() - ((COALESCE(timeout_seconds, 3600) + $2) * interval '1 second')
            "#,
        )
        .bind(queue)
        .bind(grace_period_secs)
        .execute(&self.pool)
        .await
        .context("Failed to reap stale running tasks")?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(queue = %queue, count = count, "Reaped stale running tasks");
        }

        Ok(count)
    }

    /// Cancel a pending or scheduled task
    #[tracing::instrument(skip(self), fields(db.table = "tasks", db.operation = "update"))]
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<Postgres, Task>(&format!(
            r#"
            UPDATE tasks
            SET status = 'cancelled',
                updated_at = NOW()
            WHERE id = $1
                AND status IN ('pending', 'scheduled')
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to cancel task")?;

        if task.is_some() {
            tracing::info!(task_id = %task_id, "Task cancelled");
        }

        Ok(task)
    }
}
