use reliquary_core::{
    models::{AccessTerms, FileSet, PermissionGrant},
    AppError,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const FILE_SET_COLUMNS: &str = "id, work_id, depositor, label, content_key, content_type, \
     file_size, access, permissions, attached_at, created_at, updated_at";

/// Repository for file sets
#[derive(Clone)]
pub struct FileSetRepository {
    pool: PgPool,
}

impl FileSetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a new file set, including any access terms already applied
    #[tracing::instrument(skip(self, file_set), fields(db.table = "file_sets", db.operation = "insert", db.record_id = %file_set.id))]
    pub async fn create_file_set(&self, file_set: &FileSet) -> Result<FileSet, AppError> {
        let created = sqlx::query_as::<Postgres, FileSet>(&format!(
            r#"
            INSERT INTO file_sets (id, work_id, depositor, label, access, permissions)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            FILE_SET_COLUMNS
        ))
        .bind(file_set.id)
        .bind(file_set.work_id)
        .bind(&file_set.depositor)
        .bind(&file_set.label)
        .bind(file_set.access.as_ref().map(Json))
        .bind(Json(&file_set.permissions))
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_sets", db.operation = "select", db.record_id = %id))]
    pub async fn get_file_set(&self, id: Uuid) -> Result<Option<FileSet>, AppError> {
        let file_set = sqlx::query_as::<Postgres, FileSet>(&format!(
            "SELECT {} FROM file_sets WHERE id = $1",
            FILE_SET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file_set)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_sets", db.operation = "select"))]
    pub async fn list_for_work(&self, work_id: Uuid) -> Result<Vec<FileSet>, AppError> {
        let file_sets = sqlx::query_as::<Postgres, FileSet>(&format!(
            "SELECT {} FROM file_sets WHERE work_id = $1 ORDER BY created_at ASC",
            FILE_SET_COLUMNS
        ))
        .bind(work_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(file_sets)
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_sets", db.operation = "update", db.record_id = %id))]
    pub async fn bind_content(
        &self,
        id: Uuid,
        content_key: &str,
        content_type: &str,
        file_size: i64,
    ) -> Result<FileSet, AppError> {
        sqlx::query_as::<Postgres, FileSet>(&format!(
            r#"
            UPDATE file_sets
            SET content_key = $2, content_type = $3, file_size = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            FILE_SET_COLUMNS
        ))
        .bind(id)
        .bind(content_key)
        .bind(content_type)
        .bind(file_size)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file set {}", id)))
    }

    /// Set the parent relation timestamp and the effective access terms
    #[tracing::instrument(skip(self, access), fields(db.table = "file_sets", db.operation = "update", db.record_id = %id))]
    pub async fn mark_attached(&self, id: Uuid, access: &AccessTerms) -> Result<FileSet, AppError> {
        sqlx::query_as::<Postgres, FileSet>(&format!(
            r#"
            UPDATE file_sets
            SET access = $2, attached_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            FILE_SET_COLUMNS
        ))
        .bind(id)
        .bind(Json(access))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file set {}", id)))
    }

    #[tracing::instrument(skip(self, permissions), fields(db.table = "file_sets", db.operation = "update", db.record_id = %id))]
    pub async fn set_permissions(
        &self,
        id: Uuid,
        permissions: &[PermissionGrant],
    ) -> Result<FileSet, AppError> {
        sqlx::query_as::<Postgres, FileSet>(&format!(
            "UPDATE file_sets SET permissions = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            FILE_SET_COLUMNS
        ))
        .bind(id)
        .bind(Json(permissions))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file set {}", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_sets", db.operation = "delete", db.record_id = %id))]
    pub async fn delete_file_set(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM file_sets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
