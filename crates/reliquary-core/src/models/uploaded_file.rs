use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored user upload awaiting attachment.
///
/// `storage_key` never changes after creation. `file_set_id` is written once the
/// upload has been turned into a file set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UploadedFile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub storage_key: String,
    pub original_filename: String,
    pub content_type: String,
    pub file_size: i64,
    pub file_set_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadedFile {
    pub fn new(
        user_id: Uuid,
        storage_key: impl Into<String>,
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
        file_size: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            storage_key: storage_key.into(),
            original_filename: original_filename.into(),
            content_type: content_type.into(),
            file_size,
            file_set_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// How this upload is referenced in a queued attachment batch
    pub fn batch_item(&self) -> serde_json::Value {
        serde_json::Value::String(self.id.to_string())
    }

    pub fn is_attached(&self) -> bool {
        self.file_set_id.is_some()
    }
}
