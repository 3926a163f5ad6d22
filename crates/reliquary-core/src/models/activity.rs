use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Activity-stream record written once per completed attachment job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct AttachmentEvent {
    pub id: Uuid,
    pub work_id: Uuid,
    pub user_id: Uuid,
    pub file_set_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AttachmentEvent {
    pub fn new(work_id: Uuid, user_id: Uuid, file_set_ids: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            work_id,
            user_id,
            file_set_ids,
            created_at: Utc::now(),
        }
    }
}
