//! On-disk storage for uploaded prescription files.
//!
//! Files live flat under a single root directory. Each file is named by an
//! opaque storage key `"{patient_profile_id}_{uuid}{ext}"`, which is what the
//! prescription row records in `file_path`. Keys are generated here and are
//! never derived from client input beyond the validated extension.
//!
//! Writes go to a temporary file in the same directory first and are renamed
//! into place, so a key either names a complete file or nothing.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Largest accepted upload (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Accepted file extensions, lowercase with the leading dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".jpg", ".jpeg", ".png"];

/// Errors from the blob store.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The key is not a plain file name.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// No file is stored under the key.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// Filesystem failure.
    #[error("blob I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Returns the lowercase extension of `file_name` (with the dot) if it is
/// one of [`ALLOWED_EXTENSIONS`].
#[must_use]
pub fn allowed_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    let ext = format!(".{}", ext.to_ascii_lowercase());
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Content type served for a stored extension.
#[must_use]
pub fn content_type_for(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// Flat directory of uploaded files.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Uses `root` without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root directory if needed.
    pub async fn ensure_root(&self) -> Result<(), BlobError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Generates a fresh storage key for `patient_id`.
    #[must_use]
    pub fn new_key(patient_id: &str, ext: &str) -> String {
        format!("{patient_id}_{}{ext}", uuid::Uuid::new_v4())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        let valid = !key.is_empty()
            && key != "."
            && !key.contains("..")
            && !key.contains(['/', '\\', '\0']);
        if valid {
            Ok(self.root.join(key))
        } else {
            Err(BlobError::InvalidKey(key.to_string()))
        }
    }

    /// Stores `bytes` for `patient_id` and returns the new key.
    pub async fn store(&self, patient_id: &str, ext: &str, bytes: &[u8]) -> Result<String, BlobError> {
        let key = Self::new_key(patient_id, ext);
        let path = self.path_for(&key)?;
        let tmp = self.root.join(format!(".{key}.tmp"));

        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!(key = %key, size = bytes.len(), "stored blob");
        Ok(key)
    }

    /// Opens the file stored under `key` for streaming.
    pub async fn open(&self, key: &str) -> Result<fs::File, BlobError> {
        let path = self.path_for(key)?;
        fs::File::open(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                BlobError::NotFound(key.to_string())
            } else {
                BlobError::Io(e)
            }
        })
    }

    /// Deletes the file stored under `key`. A missing file is not an error.
    pub async fn remove(&self, key: &str) -> Result<(), BlobError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true if a file is stored under `key`.
    pub async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn test_allowed_extension() {
        assert_eq!(allowed_extension("scan.pdf").as_deref(), Some(".pdf"));
        assert_eq!(allowed_extension("PHOTO.JPG").as_deref(), Some(".jpg"));
        assert_eq!(allowed_extension("x.jpeg").as_deref(), Some(".jpeg"));
        assert_eq!(allowed_extension("a.b.png").as_deref(), Some(".png"));
        assert_eq!(allowed_extension("script.exe"), None);
        assert_eq!(allowed_extension("noext"), None);
        assert_eq!(allowed_extension(".pdf"), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(".pdf"), "application/pdf");
        assert_eq!(content_type_for(".JPG"), "image/jpeg");
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for(".png"), "image/png");
        assert_eq!(content_type_for(".gif"), "application/octet-stream");
    }

    #[test]
    fn test_key_format() {
        let key = BlobStore::new_key("patient-1", ".pdf");
        assert!(key.starts_with("patient-1_"));
        assert!(key.ends_with(".pdf"));
        assert_ne!(key, BlobStore::new_key("patient-1", ".pdf"));
    }

    #[tokio::test]
    async fn test_store_open_remove() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = BlobStore::new(dir.path().join("uploads"));
        store.ensure_root().await.unwrap();

        let key = store.store("p1", ".png", b"\x89PNG data").await.unwrap();
        assert!(store.exists(&key).await.unwrap());

        let mut contents = Vec::new();
        store
            .open(&key)
            .await
            .unwrap()
            .read_to_end(&mut contents)
            .await
            .unwrap();
        assert_eq!(contents, b"\x89PNG data");

        store.remove(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
        store.remove(&key).await.unwrap();
        assert!(matches!(
            store.open(&key).await,
            Err(BlobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());
        store.store("p1", ".pdf", b"%PDF").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(".tmp"));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = BlobStore::new(dir.path());
        for key in ["../etc/passwd", "a/b.pdf", "..", "", "a\\b.pdf"] {
            assert!(
                matches!(store.open(key).await, Err(BlobError::InvalidKey(_))),
                "{key:?} accepted"
            );
            assert!(matches!(
                store.remove(key).await,
                Err(BlobError::InvalidKey(_))
            ));
        }
    }
}
