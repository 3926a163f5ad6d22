use reliquary_core::{models::UploadedFile, AppError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const UPLOADED_FILE_COLUMNS: &str = "id, user_id, storage_key, original_filename, content_type, \
     file_size, file_set_id, created_at, updated_at";

/// Repository for staged uploads
#[derive(Clone)]
pub struct UploadedFileRepository {
    pool: PgPool,
}

impl UploadedFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register an upload that is already in storage
    #[tracing::instrument(skip(self, upload), fields(db.table = "uploaded_files", db.operation = "insert", db.record_id = %upload.id))]
    pub async fn create_uploaded_file(&self, upload: &UploadedFile) -> Result<UploadedFile, AppError> {
        let created = sqlx::query_as::<Postgres, UploadedFile>(&format!(
            r#"
            INSERT INTO uploaded_files (id, user_id, storage_key, original_filename, content_type, file_size)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            UPLOADED_FILE_COLUMNS
        ))
        .bind(upload.id)
        .bind(upload.user_id)
        .bind(&upload.storage_key)
        .bind(&upload.original_filename)
        .bind(&upload.content_type)
        .bind(upload.file_size)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "uploaded_files", db.operation = "select", db.record_id = %id))]
    pub async fn get_uploaded_file(&self, id: Uuid) -> Result<Option<UploadedFile>, AppError> {
        let upload = sqlx::query_as::<Postgres, UploadedFile>(&format!(
            "SELECT {} FROM uploaded_files WHERE id = $1",
            UPLOADED_FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(upload)
    }

    /// Record the file set an upload became. Returns the reference it replaced, if any.
    #[tracing::instrument(skip(self), fields(db.table = "uploaded_files", db.operation = "update", db.record_id = %id))]
    pub async fn set_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<Option<Uuid>, AppError> {
        let previous = sqlx::query_scalar::<Postgres, Option<Uuid>>(
            r#"
            UPDATE uploaded_files u
            SET file_set_id = $2, updated_at = NOW()
            FROM (SELECT id, file_set_id FROM uploaded_files WHERE id = $1 FOR UPDATE) old
            WHERE u.id = old.id
            RETURNING old.file_set_id
            "#,
        )
        .bind(id)
        .bind(file_set_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("uploaded file {}", id)))?;

        Ok(previous)
    }

    /// Clear the back-reference, but only while it still points at `file_set_id`
    #[tracing::instrument(skip(self), fields(db.table = "uploaded_files", db.operation = "update", db.record_id = %id))]
    pub async fn clear_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE uploaded_files SET file_set_id = NULL, updated_at = NOW() WHERE id = $1 AND file_set_id = $2",
        )
        .bind(id)
        .bind(file_set_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
