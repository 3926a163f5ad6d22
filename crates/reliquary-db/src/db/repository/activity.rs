use reliquary_core::{models::AttachmentEvent, AppError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Repository for the attachment activity stream
#[derive(Clone)]
pub struct ActivityRepository {
    pool: PgPool,
}

impl ActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, file_set_ids), fields(db.table = "attachment_events", db.operation = "insert", file_set_count = file_set_ids.len()))]
    pub async fn record_attachment(
        &self,
        work_id: Uuid,
        user_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<AttachmentEvent, AppError> {
        let event = sqlx::query_as::<Postgres, AttachmentEvent>(
            r#"
            INSERT INTO attachment_events (work_id, user_id, file_set_ids)
            VALUES ($1, $2, $3)
            RETURNING id, work_id, user_id, file_set_ids, created_at
            "#,
        )
        .bind(work_id)
        .bind(user_id)
        .bind(file_set_ids)
        .fetch_one(&self.pool)
        .await?;

        Ok(event)
    }

    /// Events for a work, newest first
    #[tracing::instrument(skip(self), fields(db.table = "attachment_events", db.operation = "select"))]
    pub async fn list_for_work(&self, work_id: Uuid) -> Result<Vec<AttachmentEvent>, AppError> {
        let events = sqlx::query_as::<Postgres, AttachmentEvent>(
            r#"
            SELECT id, work_id, user_id, file_set_ids, created_at
            FROM attachment_events
            WHERE work_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(work_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
