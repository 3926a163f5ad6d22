//! Ordered-membership actor and the post-attachment callback

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use reliquary_core::models::{User, Work};
use reliquary_core::AppError;
use reliquary_db::{ActivityStore, WorkStore};

use crate::error::AttachError;

/// Hook fired once per job after the member list is committed
#[async_trait]
pub trait AttachmentCallback: Send + Sync {
    async fn after_attach(&self, work_id: Uuid, user: &User, file_set_ids: &[Uuid]) -> Result<()>;
}

/// Records each attachment in the activity stream
pub struct ActivityStreamCallback {
    activity: Arc<dyn ActivityStore>,
}

impl ActivityStreamCallback {
    pub fn new(activity: Arc<dyn ActivityStore>) -> Self {
        Self { activity }
    }
}

#[async_trait]
impl AttachmentCallback for ActivityStreamCallback {
    async fn after_attach(&self, work_id: Uuid, user: &User, file_set_ids: &[Uuid]) -> Result<()> {
        let event = self
            .activity
            .record_attachment(work_id, user.id, file_set_ids)
            .await?;
        tracing::info!(
            event_id = %event.id,
            work_id = %work_id,
            user = %user.user_key,
            file_set_count = file_set_ids.len(),
            "Recorded attachment activity"
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Committed {
    work_id: Uuid,
    added: Vec<Uuid>,
    members: Vec<Uuid>,
}

/// Writes a work's full member sequence in one operation, then fires the callback.
pub struct OrderedMembersActor {
    ordered_members: Vec<Uuid>,
    works: Arc<dyn WorkStore>,
    callback: Arc<dyn AttachmentCallback>,
    committed: Option<Committed>,
    callback_fired: bool,
}

impl OrderedMembersActor {
    pub fn new(
        ordered_members: Vec<Uuid>,
        works: Arc<dyn WorkStore>,
        callback: Arc<dyn AttachmentCallback>,
    ) -> Self {
        Self {
            ordered_members,
            works,
            callback,
            committed: None,
            callback_fired: false,
        }
    }

    /// Commit the accumulated sequence as `work`'s member list.
    ///
    /// `work.ordered_member_ids` is the snapshot the sequence was built from;
    /// the store merges when another job committed since. Returns the stored list.
    #[tracing::instrument(skip(self, work), fields(work_id = %work.id, members = self.ordered_members.len()))]
    pub async fn attach_to_work(&mut self, work: &Work) -> Result<&[Uuid], AppError> {
        let stored = self
            .works
            .commit_ordered_members(work.id, &work.ordered_member_ids, &self.ordered_members)
            .await?;

        let added = self
            .ordered_members
            .iter()
            .filter(|id| !work.ordered_member_ids.contains(id))
            .copied()
            .collect();

        let committed = self.committed.insert(Committed {
            work_id: work.id,
            added,
            members: stored,
        });
        Ok(&committed.members)
    }

    /// Fire the post-attachment callback for `user`. Runs at most once and only
    /// after a successful commit.
    pub async fn run_callback(&mut self, user: &User) -> Result<(), AttachError> {
        let Some(committed) = self.committed.as_ref() else {
            return Err(AttachError::Callback(anyhow::anyhow!(
                "ordered members must be committed before the callback runs"
            )));
        };
        if self.callback_fired {
            return Ok(());
        }
        self.callback_fired = true;
        self.callback
            .after_attach(committed.work_id, user, &committed.added)
            .await
            .map_err(AttachError::Callback)
    }
}
