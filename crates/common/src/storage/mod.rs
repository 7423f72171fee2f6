//! Local file storage for uploaded document binaries
//!
//! The orchestration core only needs a stable path to the stored file; this
//! module owns writing uploads under the configured directory and resolving
//! stored paths back to disk. Files are read-only during analysis.

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: PathBuf::from(&config.upload_dir),
        }
    }

    /// Ensure the upload directory exists
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Store an uploaded file, returning its relative path and size in bytes
    pub async fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<(String, i64)> {
        // Uuid prefix keeps same-named uploads from colliding
        let sanitized: String = Path::new(original_filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let stored_name = format!("{}_{}", Uuid::new_v4(), sanitized);

        let path = self.root.join(&stored_name);
        tokio::fs::write(&path, bytes).await.map_err(|e| AppError::Storage {
            message: format!("Failed to write {}: {}", path.display(), e),
        })?;

        Ok((stored_name, bytes.len() as i64))
    }

    /// Resolve a stored relative path to an absolute on-disk path
    pub fn resolve(&self, file_path: &str) -> PathBuf {
        self.root.join(file_path)
    }

    /// Check whether the backing file is present
    pub async fn exists(&self, file_path: &str) -> bool {
        tokio::fs::metadata(self.resolve(file_path)).await.is_ok()
    }

    /// Delete a stored file; missing files are not an error
    pub async fn delete(&self, file_path: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.resolve(file_path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage {
                message: format!("Failed to delete {}: {}", file_path, e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> FileStorage {
        let dir = std::env::temp_dir().join(format!("docugrade-test-{}", Uuid::new_v4()));
        FileStorage { root: dir }
    }

    #[tokio::test]
    async fn test_save_and_resolve() {
        let storage = temp_storage();
        storage.init().await.unwrap();

        let (path, size) = storage.save("essay.docx", b"hello").await.unwrap();
        assert_eq!(size, 5);
        assert!(path.ends_with("essay.docx"));
        assert!(storage.exists(&path).await);

        let bytes = tokio::fs::read(storage.resolve(&path)).await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let storage = temp_storage();
        storage.init().await.unwrap();
        assert!(!storage.delete("no-such-file.pdf").await.unwrap());
    }
}
