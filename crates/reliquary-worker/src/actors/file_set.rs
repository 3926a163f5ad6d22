//! File set creation actor
//!
//! Drives one unsaved [`FileSet`] through metadata, content binding and
//! attachment. Steps run in order; a failed step leaves earlier steps in place.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use reliquary_core::models::{
    AccessTerms, FileSet, PermissionGrant, UploadedFile, User, VisibilityAttributes, Work,
};
use reliquary_core::AppError;
use reliquary_db::{FileSetStore, WorkStore};
use reliquary_storage::{file_set_content_key, Storage};

use crate::error::AttachError;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub struct FileSetActor {
    file_set: FileSet,
    user: User,
    persisted: bool,
    file_sets: Arc<dyn FileSetStore>,
    works: Arc<dyn WorkStore>,
    storage: Arc<dyn Storage>,
}

impl FileSetActor {
    pub fn new(
        file_set: FileSet,
        user: User,
        file_sets: Arc<dyn FileSetStore>,
        works: Arc<dyn WorkStore>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            file_set,
            user,
            persisted: false,
            file_sets,
            works,
            storage,
        }
    }

    pub fn file_set(&self) -> &FileSet {
        &self.file_set
    }

    /// Whether the file set has a row in the store
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Validate the requested visibility and keep it as the initial access terms.
    pub fn create_metadata(&mut self, visibility: &VisibilityAttributes) -> Result<(), AttachError> {
        self.create_metadata_as_of(visibility, Utc::now().date_naive())
    }

    /// [`create_metadata`](Self::create_metadata) with an explicit current date
    pub fn create_metadata_as_of(
        &mut self,
        visibility: &VisibilityAttributes,
        today: NaiveDate,
    ) -> Result<(), AttachError> {
        if self.persisted {
            return Err(AttachError::Persistence(AppError::Internal(format!(
                "file set {} already persisted, metadata must be applied first",
                self.file_set.id
            ))));
        }
        self.file_set.access = AccessTerms::from_attributes(visibility, today)
            .map_err(|e| AttachError::InvalidMetadata(e.to_string()))?;
        Ok(())
    }

    /// Persist the file set and bind the upload's content to it.
    #[tracing::instrument(skip(self, upload), fields(file_set_id = %self.file_set.id, upload_id = %upload.id))]
    pub async fn create_content(&mut self, upload: &UploadedFile) -> Result<(), AttachError> {
        if !self.persisted {
            self.file_set.label = Some(upload.original_filename.clone());
            self.file_set = self.file_sets.insert(&self.file_set).await?;
            self.persisted = true;
        }

        let content_key = file_set_content_key(self.file_set.id, &upload.original_filename);
        self.storage.copy(&upload.storage_key, &content_key).await?;
        let size = self.storage.content_length(&content_key).await?;
        let file_size = i64::try_from(size).unwrap_or(upload.file_size);

        let content_type = if upload.content_type.trim().is_empty() {
            FALLBACK_CONTENT_TYPE
        } else {
            upload.content_type.as_str()
        };

        self.file_set = self
            .file_sets
            .bind_content(self.file_set.id, &content_key, content_type, file_size)
            .await?;

        tracing::debug!(
            content_key = %content_key,
            file_size = file_size,
            depositor = %self.user.user_key,
            "Bound upload content to file set"
        );
        Ok(())
    }

    /// Attach to `work`: set the parent relation, settle access terms and claim
    /// the representative slot if it is empty.
    #[tracing::instrument(skip(self, work), fields(file_set_id = %self.file_set.id, work_id = %work.id))]
    pub async fn attach_to_work(&mut self, work: &Work) -> Result<(), AttachError> {
        if !self.persisted {
            return Err(AttachError::Persistence(AppError::Internal(format!(
                "file set {} must be persisted before it is attached",
                self.file_set.id
            ))));
        }
        if self.file_set.work_id != work.id {
            return Err(AttachError::Persistence(AppError::Internal(format!(
                "file set {} belongs to work {}, not {}",
                self.file_set.id, self.file_set.work_id, work.id
            ))));
        }

        let access = self
            .file_set
            .access
            .clone()
            .unwrap_or_else(|| AccessTerms::plain(work.visibility));
        self.file_set = self.file_sets.mark_attached(self.file_set.id, &access).await?;

        if self
            .works
            .claim_representative(work.id, self.file_set.id)
            .await?
        {
            tracing::debug!("File set became the work's representative");
        }
        Ok(())
    }

    /// Replace the file set's grants with `permissions`.
    pub async fn assign_permissions(
        &mut self,
        permissions: &[PermissionGrant],
    ) -> Result<(), AttachError> {
        self.file_set = self
            .file_sets
            .set_permissions(self.file_set.id, permissions)
            .await?;
        Ok(())
    }

    pub fn into_file_set(self) -> FileSet {
        self.file_set
    }
}
