//! In-memory collaborator implementations for testing
//!
//! These mocks let the attachment job run without a database. Failure switches
//! make individual operations return errors so partial-failure paths can be
//! exercised.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use reliquary_core::models::{
    AccessTerms, AttachmentEvent, FileSet, PermissionGrant, UploadedFile, User, Work,
};
use reliquary_core::AppError;
use reliquary_db::{
    merge_ordered_members, ActivityStore, FileSetStore, UploadedFileStore, UserDirectory,
    WorkStore,
};

fn injected(operation: &str) -> AppError {
    AppError::Internal(format!("injected failure: {}", operation))
}

/// Mock user directory keyed by user key
#[derive(Clone, Default)]
pub struct MockUserDirectory {
    users: Arc<Mutex<HashMap<String, User>>>,
}

impl MockUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.users
            .lock()
            .unwrap()
            .insert(user.user_key.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn find_by_user_key(&self, user_key: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.lock().unwrap().get(user_key).cloned())
    }
}

/// Mock uploaded-file store
#[derive(Clone, Default)]
pub struct MockUploadedFileStore {
    uploads: Arc<Mutex<HashMap<Uuid, UploadedFile>>>,
    fail_set_file_set: Arc<Mutex<bool>>,
}

impl MockUploadedFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_upload(&self, upload: UploadedFile) {
        self.uploads.lock().unwrap().insert(upload.id, upload);
    }

    pub fn get_stored(&self, id: Uuid) -> Option<UploadedFile> {
        self.uploads.lock().unwrap().get(&id).cloned()
    }

    pub fn fail_set_file_set(&self, fail: bool) {
        *self.fail_set_file_set.lock().unwrap() = fail;
    }
}

#[async_trait]
impl UploadedFileStore for MockUploadedFileStore {
    async fn get(&self, id: Uuid) -> Result<Option<UploadedFile>, AppError> {
        Ok(self.get_stored(id))
    }

    async fn set_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<Option<Uuid>, AppError> {
        if *self.fail_set_file_set.lock().unwrap() {
            return Err(injected("set_file_set"));
        }
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("uploaded file {}", id)))?;
        let previous = upload.file_set_id.replace(file_set_id);
        upload.updated_at = Utc::now();
        Ok(previous)
    }

    async fn clear_file_set(&self, id: Uuid, file_set_id: Uuid) -> Result<bool, AppError> {
        let mut uploads = self.uploads.lock().unwrap();
        match uploads.get_mut(&id) {
            Some(upload) if upload.file_set_id == Some(file_set_id) => {
                upload.file_set_id = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
struct FileSetState {
    file_sets: HashMap<Uuid, FileSet>,
    insertion_order: Vec<Uuid>,
    /// Inserts allowed before every further insert fails
    insert_budget: Option<usize>,
    fail_attach: bool,
    fail_delete: bool,
}

/// Mock file set store that remembers insertion order
#[derive(Clone, Default)]
pub struct MockFileSetStore {
    state: Arc<Mutex<FileSetState>>,
}

impl MockFileSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_stored(&self, id: Uuid) -> Option<FileSet> {
        self.state.lock().unwrap().file_sets.get(&id).cloned()
    }

    /// File sets of `work_id`, oldest first
    pub fn for_work(&self, work_id: Uuid) -> Vec<FileSet> {
        let state = self.state.lock().unwrap();
        state
            .insertion_order
            .iter()
            .filter_map(|id| state.file_sets.get(id))
            .filter(|fs| fs.work_id == work_id)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().file_sets.len()
    }

    /// Let `n` more inserts succeed, then fail the rest
    pub fn fail_inserts_after(&self, n: usize) {
        self.state.lock().unwrap().insert_budget = Some(n);
    }

    pub fn fail_attach(&self, fail: bool) {
        self.state.lock().unwrap().fail_attach = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete = fail;
    }

    fn update<F>(&self, id: Uuid, f: F) -> Result<FileSet, AppError>
    where
        F: FnOnce(&mut FileSet),
    {
        let mut state = self.state.lock().unwrap();
        let file_set = state
            .file_sets
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("file set {}", id)))?;
        f(file_set);
        file_set.updated_at = Utc::now();
        Ok(file_set.clone())
    }
}

#[async_trait]
impl FileSetStore for MockFileSetStore {
    async fn insert(&self, file_set: &FileSet) -> Result<FileSet, AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(budget) = state.insert_budget.as_mut() {
            if *budget == 0 {
                return Err(injected("insert file set"));
            }
            *budget -= 1;
        }
        if state.file_sets.contains_key(&file_set.id) {
            return Err(AppError::Conflict(format!("file set {}", file_set.id)));
        }
        state.file_sets.insert(file_set.id, file_set.clone());
        state.insertion_order.push(file_set.id);
        Ok(file_set.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileSet>, AppError> {
        Ok(self.get_stored(id))
    }

    async fn bind_content(
        &self,
        id: Uuid,
        content_key: &str,
        content_type: &str,
        file_size: i64,
    ) -> Result<FileSet, AppError> {
        self.update(id, |fs| {
            fs.content_key = Some(content_key.to_string());
            fs.content_type = Some(content_type.to_string());
            fs.file_size = Some(file_size);
        })
    }

    async fn mark_attached(&self, id: Uuid, access: &AccessTerms) -> Result<FileSet, AppError> {
        if self.state.lock().unwrap().fail_attach {
            return Err(injected("mark_attached"));
        }
        self.update(id, |fs| {
            fs.access = Some(access.clone());
            fs.attached_at = Some(Utc::now());
        })
    }

    async fn set_permissions(
        &self,
        id: Uuid,
        permissions: &[PermissionGrant],
    ) -> Result<FileSet, AppError> {
        self.update(id, |fs| fs.permissions = permissions.to_vec())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(injected("delete file set"));
        }
        state.insertion_order.retain(|existing| *existing != id);
        Ok(state.file_sets.remove(&id).is_some())
    }
}

#[derive(Default)]
struct WorkState {
    works: HashMap<Uuid, Work>,
    commits: usize,
    fail_commits: bool,
}

/// Mock work store. Member commits merge against concurrent writers the same
/// way the PostgreSQL repository does.
#[derive(Clone, Default)]
pub struct MockWorkStore {
    state: Arc<Mutex<WorkState>>,
}

impl MockWorkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_work(&self, work: Work) {
        self.state.lock().unwrap().works.insert(work.id, work);
    }

    pub fn get_stored(&self, id: Uuid) -> Option<Work> {
        self.state.lock().unwrap().works.get(&id).cloned()
    }

    /// Mutate a stored work, e.g. to simulate another writer
    pub fn update_stored<F>(&self, id: Uuid, f: F)
    where
        F: FnOnce(&mut Work),
    {
        if let Some(work) = self.state.lock().unwrap().works.get_mut(&id) {
            f(work);
        }
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn fail_commits(&self, fail: bool) {
        self.state.lock().unwrap().fail_commits = fail;
    }
}

#[async_trait]
impl WorkStore for MockWorkStore {
    async fn get(&self, id: Uuid) -> Result<Option<Work>, AppError> {
        Ok(self.get_stored(id))
    }

    async fn claim_representative(
        &self,
        work_id: Uuid,
        file_set_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        let work = state
            .works
            .get_mut(&work_id)
            .ok_or_else(|| AppError::NotFound(format!("work {}", work_id)))?;
        if work.representative_id.is_some() && work.thumbnail_id.is_some() {
            return Ok(false);
        }
        work.representative_id.get_or_insert(file_set_id);
        work.thumbnail_id.get_or_insert(file_set_id);
        Ok(true)
    }

    async fn release_representative(
        &self,
        work_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(work) = state.works.get_mut(&work_id) {
            if work
                .representative_id
                .is_some_and(|id| file_set_ids.contains(&id))
            {
                work.representative_id = None;
            }
            if work
                .thumbnail_id
                .is_some_and(|id| file_set_ids.contains(&id))
            {
                work.thumbnail_id = None;
            }
        }
        Ok(())
    }

    async fn commit_ordered_members(
        &self,
        work_id: Uuid,
        expected: &[Uuid],
        ordered: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_commits {
            return Err(injected("commit ordered members"));
        }
        let work = state
            .works
            .get_mut(&work_id)
            .ok_or_else(|| AppError::NotFound(format!("work {}", work_id)))?;
        let merged = merge_ordered_members(&work.ordered_member_ids, expected, ordered);
        work.ordered_member_ids = merged.clone();
        work.updated_at = Utc::now();
        state.commits += 1;
        Ok(merged)
    }
}

/// Mock activity stream
#[derive(Clone, Default)]
pub struct MockActivityStore {
    events: Arc<Mutex<Vec<AttachmentEvent>>>,
}

impl MockActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AttachmentEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivityStore for MockActivityStore {
    async fn record_attachment(
        &self,
        work_id: Uuid,
        user_id: Uuid,
        file_set_ids: &[Uuid],
    ) -> Result<AttachmentEvent, AppError> {
        let event = AttachmentEvent::new(work_id, user_id, file_set_ids.to_vec());
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }
}
