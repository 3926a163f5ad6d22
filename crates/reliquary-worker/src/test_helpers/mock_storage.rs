//! Mock Storage implementation for testing

use async_trait::async_trait;
use reliquary_storage::{Storage, StorageBackend, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock storage implementation that stores files in memory
pub struct MockStorage {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_copies: Arc<Mutex<bool>>,
    fail_content_length: Arc<Mutex<bool>>,
    backend_type: StorageBackend,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            fail_copies: Arc::new(Mutex::new(false)),
            fail_content_length: Arc::new(Mutex::new(false)),
            backend_type: StorageBackend::Local,
        }
    }

    /// Set a file in the mock storage
    pub fn set_file(&self, key: &str, data: Vec<u8>) {
        self.files.lock().unwrap().insert(key.to_string(), data);
    }

    /// Remove a file from the mock storage
    pub fn remove_file(&self, key: &str) {
        self.files.lock().unwrap().remove(key);
    }

    /// Check if a file exists in the mock storage
    pub fn has_file(&self, key: &str) -> bool {
        self.files.lock().unwrap().contains_key(key)
    }

    /// Get file data (for test assertions)
    pub fn get_file(&self, key: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(key).cloned()
    }

    /// Keys under `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Make every copy fail with a backend error
    pub fn fail_copies(&self, fail: bool) {
        *self.fail_copies.lock().unwrap() = fail;
    }

    /// Make every size lookup fail with a backend error
    pub fn fail_content_length(&self, fail: bool) {
        *self.fail_content_length.lock().unwrap() = fail;
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        self.set_file(storage_key, data);
        Ok(format!("mock://{}", storage_key))
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.get_file(storage_key)
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.remove_file(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        Ok(self.has_file(storage_key))
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        if *self.fail_content_length.lock().unwrap() {
            return Err(StorageError::BackendError(format!(
                "injected size lookup failure: {}",
                storage_key
            )));
        }
        self.get_file(storage_key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<String> {
        if *self.fail_copies.lock().unwrap() {
            return Err(StorageError::BackendError(format!(
                "injected copy failure: {} -> {}",
                from_key, to_key
            )));
        }
        let data = self
            .get_file(from_key)
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        self.set_file(to_key, data);
        Ok(format!("mock://{}", to_key))
    }

    fn backend_type(&self) -> StorageBackend {
        self.backend_type
    }
}
