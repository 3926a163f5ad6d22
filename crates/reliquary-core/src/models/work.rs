use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PermissionGrant, Visibility};

/// Parent repository record that aggregates file sets.
///
/// `ordered_member_ids` is the authoritative member order. It is only ever
/// replaced as a whole (see `WorkStore::commit_ordered_members`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: Uuid,
    pub title: String,
    pub depositor: String,
    /// Set on proxy deposits: the user the depositor acted for
    pub on_behalf_of: Option<String>,
    pub ordered_member_ids: Vec<Uuid>,
    pub permissions: Vec<PermissionGrant>,
    pub visibility: Visibility,
    pub representative_id: Option<Uuid>,
    pub thumbnail_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Work {
    pub fn new(title: impl Into<String>, depositor: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            depositor: depositor.into(),
            on_behalf_of: None,
            ordered_member_ids: Vec::new(),
            permissions: Vec::new(),
            visibility: Visibility::Restricted,
            representative_id: None,
            thumbnail_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_proxy_deposit(&self) -> bool {
        self.on_behalf_of
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// User key files attached to `work` should be credited to.
///
/// A proxy deposit names the user the proxy acted for, who becomes the
/// depositor; otherwise the work's own depositor is used.
pub fn resolve_depositor(work: &Work) -> &str {
    match work.on_behalf_of.as_deref() {
        Some(key) if !key.trim().is_empty() => key,
        _ => &work.depositor,
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Work {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::types::Json;
        use sqlx::Row;
        Ok(Work {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            depositor: row.try_get("depositor")?,
            on_behalf_of: row.try_get("on_behalf_of")?,
            ordered_member_ids: row.try_get("ordered_member_ids")?,
            permissions: row
                .try_get::<Json<Vec<PermissionGrant>>, _>("permissions")?
                .0,
            visibility: row.try_get::<String, _>("visibility")?.parse().map_err(|e| {
                sqlx::Error::Decode(format!("Failed to parse visibility: {}", e).into())
            })?,
            representative_id: row.try_get("representative_id")?,
            thumbnail_id: row.try_get("thumbnail_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
