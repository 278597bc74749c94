//! Upload validation and storage for report images.
//!
//! Validates an uploaded image against the extension allow-list and size
//! bound, then persists it under a generated unique name. Invalid uploads are
//! rejected without writing anything.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ArtifactError;
use crate::models::ImageUpload;

const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Filesystem-backed artifact store. Stored files land under
/// `<root>/uploads/issues/` and are referenced by the relative path
/// `/uploads/issues/<name>` returned from [`FsArtifactStore::save`].
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Validate and persist an upload, returning the stored reference path.
    pub async fn save(&self, upload: &ImageUpload) -> Result<String, ArtifactError> {
        let ext = extension_of(&upload.file_name).ok_or(ArtifactError::Extension)?;
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ArtifactError::Extension);
        }
        if upload.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ArtifactError::TooLarge);
        }

        let dir = self.root.join("uploads").join("issues");
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        tokio::fs::write(dir.join(&file_name), &upload.bytes).await?;

        Ok(format!("/uploads/issues/{file_name}"))
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> (FsArtifactStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("civic-reports-{tag}-{}", Uuid::new_v4()));
        (FsArtifactStore::new(&root), root)
    }

    fn upload(file_name: &str, len: usize) -> ImageUpload {
        ImageUpload {
            file_name: file_name.to_string(),
            bytes: vec![0u8; len],
        }
    }

    #[tokio::test]
    async fn valid_upload_is_stored_and_referenced() {
        let (store, root) = temp_store("valid");

        let reference = store.save(&upload("pothole.png", 1024)).await.unwrap();
        assert!(reference.starts_with("/uploads/issues/"));
        assert!(reference.ends_with(".png"));

        let on_disk = root.join(reference.trim_start_matches('/'));
        assert_eq!(std::fs::read(on_disk).unwrap().len(), 1024);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn extension_check_is_case_insensitive() {
        let (store, root) = temp_store("case");

        let reference = store.save(&upload("SIGN.JPG", 16)).await.unwrap();
        assert!(reference.ends_with(".jpg"));

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn disallowed_extension_is_rejected_without_writing() {
        let (store, root) = temp_store("ext");

        let err = store.save(&upload("clip.gif", 16)).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Extension));
        let err = store.save(&upload("noext", 16)).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Extension));

        // Nothing was persisted, not even the directory.
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_without_writing() {
        let (store, root) = temp_store("size");

        let err = store
            .save(&upload("big.png", MAX_UPLOAD_BYTES + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::TooLarge));
        assert_eq!(err.reason(), "size");
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn exact_size_limit_is_accepted() {
        let (store, root) = temp_store("limit");

        assert!(store.save(&upload("ok.webp", MAX_UPLOAD_BYTES)).await.is_ok());

        std::fs::remove_dir_all(&root).ok();
    }
}
