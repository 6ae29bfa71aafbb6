//! Local filesystem object store
//!
//! Objects live at `root/<key>`. Writes go to a sibling `.tmp` file first and
//! are renamed into place, so readers never observe a partial document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use super::{validate_key, ObjectStore, StoredObject};
use crate::constants::files;
use crate::errors::{StorageError, StorageResult};

/// Object store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn temp_path_for(final_path: &Path) -> PathBuf {
        let mut temp = final_path.as_os_str().to_owned();
        temp.push(files::TEMP_FILE_SUFFIX);
        PathBuf::from(temp)
    }

    async fn write_temp(temp_path: &Path, body: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp_path).await?;
        file.write_all(body).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn ping(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Unavailable {
                reason: format!("cannot create {}: {}", self.root.display(), e),
            })?;

        let metadata = fs::metadata(&self.root)
            .await
            .map_err(|e| StorageError::Unavailable {
                reason: format!("cannot stat {}: {}", self.root.display(), e),
            })?;
        if metadata.permissions().readonly() {
            return Err(StorageError::Unavailable {
                reason: format!("{} is read-only", self.root.display()),
            });
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<StoredObject> {
        let final_path = self.path_for(key)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = Self::temp_path_for(&final_path);
        if let Err(e) = Self::write_temp(&temp_path, &body).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Upload {
                key: key.to_string(),
                reason: e.to_string(),
            });
        }

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            error!("Failed to rename temporary file: {}", e);
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::AtomicOperationFailed {
                temp_path,
                final_path,
            });
        }

        debug!("Stored {} ({} bytes)", final_path.display(), body.len());
        Ok(StoredObject {
            key: key.to_string(),
            local_path: Some(final_path),
            size: body.len() as u64,
        })
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.path_for(key).ok()
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
