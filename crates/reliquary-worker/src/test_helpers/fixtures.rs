//! Test fixtures for the attachment job

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use reliquary_core::models::{PermissionGrant, UploadedFile, User, Visibility, Work};
use reliquary_core::OrphanPolicy;

use super::mock_repositories::{
    MockActivityStore, MockFileSetStore, MockUploadedFileStore, MockUserDirectory, MockWorkStore,
};
use super::mock_storage::MockStorage;
use crate::actors::{ActivityStreamCallback, AttachmentCallback};
use crate::jobs::{AttachFilesToWork, AttachServices};

/// Create a test work with the given depositor and grants
pub fn create_test_work(depositor: &str, permissions: Vec<PermissionGrant>) -> Work {
    let mut work = Work::new("Test work", depositor);
    work.permissions = permissions;
    work.visibility = Visibility::Restricted;
    work
}

/// Create an uploaded-file record for `filename` owned by `user_id`
pub fn create_test_upload(user_id: Uuid, filename: &str, content_type: &str, size: i64) -> UploadedFile {
    UploadedFile::new(
        user_id,
        format!("uploads/{}/{}", Uuid::new_v4(), filename),
        filename,
        content_type,
        size,
    )
}

/// Convert a JSON literal into an attributes map
pub fn attributes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// One observed callback invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackCall {
    pub work_id: Uuid,
    pub user_key: String,
    pub file_set_ids: Vec<Uuid>,
}

/// Callback that records its invocations
#[derive(Default)]
pub struct RecordingCallback {
    calls: Mutex<Vec<CallbackCall>>,
    fail: bool,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the call, then fails
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<CallbackCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AttachmentCallback for RecordingCallback {
    async fn after_attach(&self, work_id: Uuid, user: &User, file_set_ids: &[Uuid]) -> Result<()> {
        self.calls.lock().unwrap().push(CallbackCall {
            work_id,
            user_key: user.user_key.clone(),
            file_set_ids: file_set_ids.to_vec(),
        });
        if self.fail {
            return Err(anyhow!("activity stream unavailable"));
        }
        Ok(())
    }
}

/// In-memory world for driving [`AttachFilesToWork`] end to end
pub struct AttachHarness {
    pub users: Arc<MockUserDirectory>,
    pub uploads: Arc<MockUploadedFileStore>,
    pub file_sets: Arc<MockFileSetStore>,
    pub works: Arc<MockWorkStore>,
    pub activity: Arc<MockActivityStore>,
    pub storage: Arc<MockStorage>,
    pub callback: Arc<RecordingCallback>,
}

impl AttachHarness {
    pub fn new() -> Self {
        Self {
            users: Arc::new(MockUserDirectory::new()),
            uploads: Arc::new(MockUploadedFileStore::new()),
            file_sets: Arc::new(MockFileSetStore::new()),
            works: Arc::new(MockWorkStore::new()),
            activity: Arc::new(MockActivityStore::new()),
            storage: Arc::new(MockStorage::new()),
            callback: Arc::new(RecordingCallback::new()),
        }
    }

    /// Swap in a different recording callback
    pub fn with_callback(mut self, callback: RecordingCallback) -> Self {
        self.callback = Arc::new(callback);
        self
    }

    pub fn add_user(&self, user_key: &str) -> User {
        let user = User::new(user_key);
        self.users.add_user(user.clone());
        user
    }

    pub fn add_work(&self, work: Work) -> Work {
        self.works.add_work(work.clone());
        work
    }

    /// Register an upload and put its bytes in storage
    pub fn stage_upload(&self, user: &User, filename: &str, data: &[u8]) -> UploadedFile {
        let upload = create_test_upload(user.id, filename, "application/pdf", data.len() as i64);
        self.storage.set_file(&upload.storage_key, data.to_vec());
        self.uploads.add_upload(upload.clone());
        upload
    }

    /// Current stored state of `work`
    pub fn work(&self, id: Uuid) -> Work {
        self.works
            .get_stored(id)
            .unwrap_or_else(|| panic!("work {} not in harness", id))
    }

    fn services_with(&self, callback: Arc<dyn AttachmentCallback>) -> AttachServices {
        AttachServices {
            users: self.users.clone(),
            uploads: self.uploads.clone(),
            file_sets: self.file_sets.clone(),
            works: self.works.clone(),
            storage: self.storage.clone(),
            callback,
        }
    }

    /// Services wired to the recording callback
    pub fn services(&self) -> AttachServices {
        self.services_with(self.callback.clone())
    }

    pub fn job(&self, orphan_policy: OrphanPolicy) -> AttachFilesToWork {
        AttachFilesToWork::new(self.services(), orphan_policy)
    }

    /// Job whose callback writes to the mock activity stream
    pub fn job_with_activity_stream(&self, orphan_policy: OrphanPolicy) -> AttachFilesToWork {
        let callback = Arc::new(ActivityStreamCallback::new(self.activity.clone()));
        AttachFilesToWork::new(self.services_with(callback), orphan_policy)
    }
}

impl Default for AttachHarness {
    fn default() -> Self {
        Self::new()
    }
}
