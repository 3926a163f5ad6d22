//! Attach a batch of uploaded files to a work.
//!
//! The job runs in two phases. Phase 1 ([`AttachFilesToWork::create_file_sets`])
//! turns each upload into a file set, one at a time and in input order. Phase 2
//! ([`AttachFilesToWork::commit_members`]) writes the work's whole member list
//! once and fires the post-attachment callback. Nothing is rolled back on
//! failure unless the orphan policy is [`OrphanPolicy::Remove`].

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use reliquary_core::models::{
    json_kind, resolve_depositor, AccessTerms, AttachFilesToWorkPayload, FileSet, Priority, Task,
    TaskType, UploadedFile, User, VisibilityAttributes, Work,
};
use reliquary_core::OrphanPolicy;
use reliquary_db::{FileSetStore, UploadedFileStore, UserDirectory, WorkStore};
use reliquary_storage::{file_set_content_key, Storage};

use crate::actors::{AttachmentCallback, FileSetActor, OrderedMembersActor};
use crate::error::AttachError;
use crate::queue::TaskSubmitter;

/// Collaborators the job runs against
#[derive(Clone)]
pub struct AttachServices {
    pub users: Arc<dyn UserDirectory>,
    pub uploads: Arc<dyn UploadedFileStore>,
    pub file_sets: Arc<dyn FileSetStore>,
    pub works: Arc<dyn WorkStore>,
    pub storage: Arc<dyn Storage>,
    pub callback: Arc<dyn AttachmentCallback>,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq)]
pub struct AttachOutcome {
    pub work_id: Uuid,
    /// New file sets in input order
    pub file_sets: Vec<FileSet>,
    /// The work's member list as stored by the commit
    pub ordered_member_ids: Vec<Uuid>,
}

impl AttachOutcome {
    pub fn file_set_ids(&self) -> Vec<Uuid> {
        self.file_sets.iter().map(|fs| fs.id).collect()
    }
}

/// A phase-1 file set and the upload it came from
#[derive(Debug, Clone)]
struct CreatedFileSet {
    file_set: FileSet,
    upload_id: Uuid,
    /// Where the upload's content is copied, bound or not
    content_key: String,
}

impl CreatedFileSet {
    fn new(file_set: FileSet, upload: &UploadedFile) -> Self {
        let content_key = file_set_content_key(file_set.id, &upload.original_filename);
        Self {
            file_set,
            upload_id: upload.id,
            content_key,
        }
    }
}

#[derive(Clone)]
pub struct AttachFilesToWork {
    services: AttachServices,
    orphan_policy: OrphanPolicy,
}

impl AttachFilesToWork {
    pub fn new(services: AttachServices, orphan_policy: OrphanPolicy) -> Self {
        Self {
            services,
            orphan_policy,
        }
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    /// Run a queued job: load the work and perform.
    #[tracing::instrument(skip(self, payload), fields(work_id = %payload.work_id, batch_size = payload.uploaded_files.len()))]
    pub async fn run(&self, payload: &AttachFilesToWorkPayload) -> Result<AttachOutcome, AttachError> {
        let work = self
            .services
            .works
            .get(payload.work_id)
            .await?
            .ok_or(AttachError::WorkNotFound(payload.work_id))?;

        self.perform(&work, &payload.uploaded_files, &payload.work_attributes)
            .await
    }

    /// Attach every upload in `batch` to `work`.
    ///
    /// `batch` elements must be strings holding ids of registered uploads. The
    /// whole batch is checked before anything is written.
    #[tracing::instrument(skip(self, work, batch, work_attributes), fields(work_id = %work.id, batch_size = batch.len()))]
    pub async fn perform(
        &self,
        work: &Work,
        batch: &[Value],
        work_attributes: &Map<String, Value>,
    ) -> Result<AttachOutcome, AttachError> {
        let uploads = self.validate_files(batch).await?;

        let depositor = resolve_depositor(work);
        let user = self
            .services
            .users
            .find_by_user_key(depositor)
            .await?
            .ok_or_else(|| AttachError::DepositorNotFound(depositor.to_string()))?;

        let visibility = VisibilityAttributes::extract(work_attributes);
        // Fail bad terms before the first file set exists.
        AccessTerms::from_attributes(&visibility, chrono::Utc::now().date_naive())
            .map_err(|e| AttachError::InvalidMetadata(e.to_string()))?;

        let created = self
            .create_file_sets(work, &user, &uploads, &visibility)
            .await?;
        let ordered_member_ids = self.commit_members(work, &user, &created).await?;

        tracing::info!(
            work_id = %work.id,
            depositor = %user.user_key,
            attached = created.len(),
            members = ordered_member_ids.len(),
            "Attached files to work"
        );

        Ok(AttachOutcome {
            work_id: work.id,
            file_sets: created.into_iter().map(|c| c.file_set).collect(),
            ordered_member_ids,
        })
    }

    /// Resolve every batch element to its uploaded-file record.
    pub async fn validate_files(&self, batch: &[Value]) -> Result<Vec<UploadedFile>, AttachError> {
        let mut ids = Vec::with_capacity(batch.len());
        for (position, item) in batch.iter().enumerate() {
            let id = match item {
                Value::String(raw) => {
                    Uuid::parse_str(raw.trim()).map_err(|_| AttachError::InvalidUpload {
                        position,
                        found: "malformed id".to_string(),
                    })?
                }
                other => {
                    return Err(AttachError::InvalidUpload {
                        position,
                        found: json_kind(other).to_string(),
                    })
                }
            };
            ids.push(id);
        }

        let mut uploads = Vec::with_capacity(ids.len());
        for (position, id) in ids.into_iter().enumerate() {
            let upload = self.services.uploads.get(id).await?.ok_or_else(|| {
                AttachError::InvalidUpload {
                    position,
                    found: "unregistered upload".to_string(),
                }
            })?;
            uploads.push(upload);
        }
        Ok(uploads)
    }

    /// Phase 1: create, bind and attach one file set per upload, in order.
    async fn create_file_sets(
        &self,
        work: &Work,
        user: &User,
        uploads: &[UploadedFile],
        visibility: &VisibilityAttributes,
    ) -> Result<Vec<CreatedFileSet>, AttachError> {
        let mut created: Vec<CreatedFileSet> = Vec::with_capacity(uploads.len());

        for (position, upload) in uploads.iter().enumerate() {
            let mut actor = FileSetActor::new(
                FileSet::new(work.id, user.user_key.clone()),
                user.clone(),
                self.services.file_sets.clone(),
                self.services.works.clone(),
                self.services.storage.clone(),
            );

            match self
                .create_one(&mut actor, work, upload, visibility)
                .await
            {
                Ok(()) => created.push(CreatedFileSet::new(actor.into_file_set(), upload)),
                Err(source) => {
                    tracing::error!(
                        work_id = %work.id,
                        upload_id = %upload.id,
                        position = position,
                        error = %source,
                        "File set creation failed"
                    );
                    let mut leftovers = created;
                    if actor.is_persisted() {
                        leftovers.push(CreatedFileSet::new(actor.into_file_set(), upload));
                    }
                    let orphaned = self.handle_orphans(work, leftovers).await;
                    return Err(AttachError::ChildCreation {
                        position,
                        upload_id: upload.id,
                        orphaned,
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(created)
    }

    async fn create_one(
        &self,
        actor: &mut FileSetActor,
        work: &Work,
        upload: &UploadedFile,
        visibility: &VisibilityAttributes,
    ) -> Result<(), AttachError> {
        actor.create_metadata(visibility)?;
        actor.create_content(upload).await?;
        actor.attach_to_work(work).await?;
        actor.assign_permissions(&work.permissions).await?;

        let file_set_id = actor.file_set().id;
        if let Some(previous) = self
            .services
            .uploads
            .set_file_set(upload.id, file_set_id)
            .await?
        {
            if previous != file_set_id {
                tracing::warn!(
                    upload_id = %upload.id,
                    previous_file_set_id = %previous,
                    file_set_id = %file_set_id,
                    "Uploaded file was already attached, back-reference replaced"
                );
            }
        }
        Ok(())
    }

    /// Phase 2: commit the accumulated member list and fire the callback.
    async fn commit_members(
        &self,
        work: &Work,
        user: &User,
        created: &[CreatedFileSet],
    ) -> Result<Vec<Uuid>, AttachError> {
        let mut ordered = work.ordered_member_ids.clone();
        ordered.extend(created.iter().map(|c| c.file_set.id));

        let mut actor = OrderedMembersActor::new(
            ordered,
            self.services.works.clone(),
            self.services.callback.clone(),
        );

        let stored = match actor.attach_to_work(work).await {
            Ok(stored) => stored.to_vec(),
            Err(source) => {
                tracing::error!(work_id = %work.id, error = %source, "Ordered member commit failed");
                let orphaned = self.handle_orphans(work, created.to_vec()).await;
                return Err(AttachError::Commit {
                    work_id: work.id,
                    orphaned,
                    source,
                });
            }
        };

        actor.run_callback(user).await?;
        Ok(stored)
    }

    /// Apply the orphan policy to file sets left outside the member list.
    /// Returns the ids that remain orphaned.
    async fn handle_orphans(&self, work: &Work, orphans: Vec<CreatedFileSet>) -> Vec<Uuid> {
        if orphans.is_empty() {
            return Vec::new();
        }

        match self.orphan_policy {
            OrphanPolicy::Retain => {
                let ids: Vec<Uuid> = orphans.iter().map(|c| c.file_set.id).collect();
                tracing::warn!(
                    work_id = %work.id,
                    orphaned = ?ids,
                    "File sets attached by parent reference but missing from ordered members"
                );
                ids
            }
            OrphanPolicy::Remove => {
                let mut removed = Vec::with_capacity(orphans.len());
                let mut remaining = Vec::new();
                for orphan in orphans {
                    let id = orphan.file_set.id;
                    match self.remove_orphan(&orphan).await {
                        Ok(()) => removed.push(id),
                        Err(e) => {
                            tracing::error!(
                                work_id = %work.id,
                                file_set_id = %id,
                                error = %e,
                                "Failed to remove orphaned file set"
                            );
                            remaining.push(id);
                        }
                    }
                }

                if !removed.is_empty() {
                    if let Err(e) = self
                        .services
                        .works
                        .release_representative(work.id, &removed)
                        .await
                    {
                        tracing::error!(
                            work_id = %work.id,
                            error = %e,
                            "Failed to release representative of removed file sets"
                        );
                    }
                    tracing::warn!(
                        work_id = %work.id,
                        removed = ?removed,
                        "Removed orphaned file sets"
                    );
                }
                remaining
            }
        }
    }

    async fn remove_orphan(&self, orphan: &CreatedFileSet) -> Result<(), AttachError> {
        let file_set = &orphan.file_set;
        // The copy may exist even when binding it failed.
        let key = file_set
            .content_key
            .as_deref()
            .unwrap_or(&orphan.content_key);
        self.services.storage.delete(key).await?;
        self.services
            .uploads
            .clear_file_set(orphan.upload_id, file_set.id)
            .await?;
        self.services.file_sets.delete(file_set.id).await?;
        Ok(())
    }
}

/// Queue an attachment job on `queue_name`.
pub async fn enqueue_attach_files(
    queue: &dyn TaskSubmitter,
    queue_name: &str,
    payload: &AttachFilesToWorkPayload,
) -> Result<Uuid> {
    if queue_name.trim().is_empty() {
        return Err(anyhow!("Queue name cannot be empty"));
    }

    let task_id = queue
        .submit_task(
            queue_name,
            TaskType::AttachFilesToWork,
            Task::payload_from(payload)?,
            Priority::Normal,
            None,
        )
        .await?;

    tracing::info!(
        task_id = %task_id,
        queue = %queue_name,
        work_id = %payload.work_id,
        batch_size = payload.uploaded_files.len(),
        "Enqueued attachment job"
    );
    Ok(task_id)
}
