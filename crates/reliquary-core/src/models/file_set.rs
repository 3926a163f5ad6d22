use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccessTerms, PermissionGrant};

/// Managed unit wrapping one uploaded file's content, owned by exactly one work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSet {
    pub id: Uuid,
    pub work_id: Uuid,
    pub depositor: String,
    pub label: Option<String>,
    pub content_key: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<i64>,
    /// Unset until visibility terms are applied or inherited from the work
    pub access: Option<AccessTerms>,
    pub permissions: Vec<PermissionGrant>,
    pub attached_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileSet {
    /// Unsaved instance for `work_id`, deposited by `depositor`
    pub fn new(work_id: Uuid, depositor: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            work_id,
            depositor: depositor.into(),
            label: None,
            content_key: None,
            content_type: None,
            file_size: None,
            access: None,
            permissions: Vec::new(),
            attached_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_content_bound(&self) -> bool {
        self.content_key.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.attached_at.is_some()
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for FileSet {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::types::Json;
        use sqlx::Row;
        Ok(FileSet {
            id: row.try_get("id")?,
            work_id: row.try_get("work_id")?,
            depositor: row.try_get("depositor")?,
            label: row.try_get("label")?,
            content_key: row.try_get("content_key")?,
            content_type: row.try_get("content_type")?,
            file_size: row.try_get("file_size")?,
            access: row
                .try_get::<Option<Json<AccessTerms>>, _>("access")?
                .map(|json| json.0),
            permissions: row
                .try_get::<Json<Vec<PermissionGrant>>, _>("permissions")?
                .0,
            attached_at: row.try_get("attached_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
