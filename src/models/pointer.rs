//! Pointer files remembering where a model's artifacts were downloaded.
//!
//! Layout under the storage directory:
//! ```text
//! <storage>/
//! ├── BAAI_bge-base-en-v1.5-key      # one line: artifact directory
//! ├── BAAI_bge-reranker-v2-m3-key
//! └── cache/                         # hub-managed download cache
//! ```

use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct PointerFile {
    path: PathBuf,
}

impl PointerFile {
    /// Filesystem-safe pointer filename: path separators become `_`.
    pub fn file_name(model_id: &str) -> String {
        format!("{}-key", model_id.replace(['/', '\\'], "_"))
    }

    pub fn for_model(storage_dir: &Path, model_id: &str) -> Self {
        Self {
            path: storage_dir.join(Self::file_name(model_id)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded artifact directory.
    ///
    /// Returns `None` when no pointer exists, or when the recorded directory
    /// is gone, in which case the stale pointer is removed.
    pub async fn read(&self) -> Result<Option<PathBuf>> {
        if !fs::try_exists(&self.path).await.map_err(|e| self.read_error(e))? {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.read_error(e))?;
        let recorded = PathBuf::from(contents.trim());

        let present = if recorded.as_os_str().is_empty() {
            false
        } else {
            fs::try_exists(&recorded)
                .await
                .map_err(|e| self.read_error(e))?
        };

        if !present {
            tracing::warn!(
                pointer = %self.path.display(),
                recorded = %recorded.display(),
                "Recorded model path no longer exists, discarding pointer"
            );
            fs::remove_file(&self.path).await.map_err(|e| {
                AppError::StorageError(format!(
                    "Failed to remove stale pointer {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
            return Ok(None);
        }

        Ok(Some(recorded))
    }

    fn read_error(&self, err: std::io::Error) -> AppError {
        AppError::PointerReadError(format!("{}: {}", self.path.display(), err))
    }

    pub async fn write(&self, artifact_dir: &Path) -> Result<()> {
        fs::write(&self.path, artifact_dir.display().to_string())
            .await
            .map_err(|e| {
                AppError::StorageError(format!(
                    "Failed to write pointer {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }
}
