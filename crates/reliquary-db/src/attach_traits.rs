//! Collaborator traits for the attachment pipeline
//!
//! The orchestrator and actors depend on these narrow interfaces rather than on
//! the concrete repositories, so they can be driven by in-memory fakes in tests.
//! Each trait is implemented below for the matching PostgreSQL repository.

use async_trait::async_trait;
use reliquary_core::error::AppError;
use reliquary_core::models::{
    AccessTerms, AttachmentEvent, FileSet, PermissionGrant, UploadedFile, User, Work,
};
use uuid::Uuid;

use crate::db::repository::{
    ActivityRepository, FileSetRepository, UploadedFileRepository, UserRepository, WorkRepository,
};

/// Lookup of depositing users
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_user_key(&self, user_key: &str) -> Result<Option<User>, AppError>;
}

/// Staged uploads and their file-set back-reference
#[async_trait]
pub trait UploadedFileStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<UploadedFile>, AppError>;

    /// Point the upload at `file_set_id`, returning the reference it replaced
    async fn set_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<Option<Uuid>, AppError>;

    /// Clear the reference if it still points at `file_set_id`
    async fn clear_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait FileSetStore: Send + Sync {
    async fn insert(&self, file_set: &FileSet) -> Result<FileSet, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<FileSet>, AppError>;

    async fn bind_content(
        &self,
        id: Uuid,
        content_key: &str,
        content_type: &str,
        file_size: i64,
    ) -> Result<FileSet, AppError>;

    async fn mark_attached(&self, id: Uuid, access: &AccessTerms) -> Result<FileSet, AppError>;

    async fn set_permissions(
        &self,
        id: Uuid,
        permissions: &[PermissionGrant],
    ) -> Result<FileSet, AppError>;

    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Work>, AppError>;

    /// Fill an empty representative/thumbnail slot with `file_set_id`
    async fn claim_representative(&self, work_id: Uuid, file_set_id: Uuid)
        -> Result<bool, AppError>;

    async fn release_representative(
        &self,
        work_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<(), AppError>;

    /// Store `ordered` as the member list in a single operation. `expected` is
    /// the snapshot `ordered` was built from. Returns the stored list.
    async fn commit_ordered_members(
        &self,
        work_id: Uuid,
        expected: &[Uuid],
        ordered: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError>;
}

/// Sink for the post-attachment activity stream
#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn record_attachment(
        &self,
        work_id: Uuid,
        user_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<AttachmentEvent, AppError>;
}

// Implementations for concrete repository types

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_user_key(&self, user_key: &str) -> Result<Option<User>, AppError> {
        UserRepository::find_by_user_key(self, user_key).await
    }
}

#[async_trait]
impl UploadedFileStore for UploadedFileRepository {
    async fn get(&self, id: Uuid) -> Result<Option<UploadedFile>, AppError> {
        self.get_uploaded_file(id).await
    }

    async fn set_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<Option<Uuid>, AppError> {
        UploadedFileRepository::set_file_set(self, id, file_set_id).await
    }

    async fn clear_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<bool, AppError> {
        UploadedFileRepository::clear_file_set(self, id, file_set_id).await
    }
}

#[async_trait]
impl FileSetStore for FileSetRepository {
    async fn insert(&self, file_set: &FileSet) -> Result<FileSet, AppError> {
        self.create_file_set(file_set).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileSet>, AppError> {
        self.get_file_set(id).await
    }

    async fn bind_content(
        &self,
        id: Uuid,
        content_key: &str,
        content_type: &str,
        file_size: i64,
    ) -> Result<FileSet, AppError> {
        FileSetRepository::bind_content(self, id, content_key, content_type, file_size).await
    }

    async fn mark_attached(&self, id: Uuid, access: &AccessTerms) -> Result<FileSet, AppError> {
        FileSetRepository::mark_attached(self, id, access).await
    }

    async fn set_permissions(
        &self,
        id: Uuid,
        permissions: &[PermissionGrant],
    ) -> Result<FileSet, AppError> {
        FileSetRepository::set_permissions(self, id, permissions).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        self.delete_file_set(id).await
    }
}

#[async_trait]
impl WorkStore for WorkRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Work>, AppError> {
        self.get_work(id).await
    }

    async fn claim_representative(
        &self,
        work_id: Uuid,
        file_set_id: Uuid,
    ) -> Result<bool, AppError> {
        WorkRepository::claim_representative(self, work_id, file_set_id).await
    }

    async fn release_representative(
        &self,
        work_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<(), AppError> {
        WorkRepository::release_representative(self, work_id, file_set_ids).await
    }

    async fn commit_ordered_members(
        &self,
        work_id: Uuid,
        expected: &[Uuid],
        ordered: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError> {
        WorkRepository::commit_ordered_members(self, work_id, expected, ordered).await
    }
}

#[async_trait]
impl ActivityStore for ActivityRepository {
    async fn record_attachment(
        &self,
        work_id: Uuid,
        user_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<AttachmentEvent, AppError> {
        ActivityRepository::record_attachment(self, work_id, user_id, file_set_ids).await
    }
}
