//! Shared key generation for storage backends.

use crate::{StorageError, StorageResult};
use uuid::Uuid;

const FALLBACK_FILENAME: &str = "content";

/// Key under which a file set's bound content is stored:
/// `file_sets/{file_set_id}/{filename}`.
///
/// Only the final path component of `filename` is kept, and characters outside
/// `[A-Za-z0-9._-]` are replaced with `_`.
pub fn file_set_content_key(file_set_id: Uuid, filename: &str) -> String {
    format!("file_sets/{}/{}", file_set_id, sanitize_filename(filename))
}

pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Reject keys that could escape the storage root
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if storage_key.contains("..") || storage_key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_keeps_plain_names() {
        let id = Uuid::new_v4();
        assert_eq!(
            file_set_content_key(id, "scan-01.tiff"),
            format!("file_sets/{}/scan-01.tiff", id)
        );
    }

    #[test]
    fn content_key_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\my thesis.pdf"), "my_thesis.pdf");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "content");
        assert_eq!(sanitize_filename("..."), "content");
    }

    #[test]
    fn generated_keys_pass_validation() {
        let key = file_set_content_key(Uuid::new_v4(), "../x.txt");
        assert!(validate_key(&key).is_ok());
        assert!(validate_key("../x").is_err());
        assert!(validate_key("/abs").is_err());
        assert!(validate_key("").is_err());
    }
}
