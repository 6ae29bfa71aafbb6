//! Durable object storage for downloaded documents
//!
//! Documents are written under the deterministic key from
//! [`crate::app::models::storage_key`]. Two backends are provided: a local
//! filesystem tree written with temp file + rename, and S3-compatible
//! buckets through the AWS SDK.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::errors::{StorageError, StorageResult};

pub mod filesystem;
pub mod s3;

pub use filesystem::FilesystemStore;
pub use s3::S3Store;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// Local file path for filesystem-backed stores
    pub local_path: Option<PathBuf>,
    pub size: u64,
}

/// Object storage backend
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Verify the backend is reachable and writable enough to start a batch
    async fn ping(&self) -> StorageResult<()>;

    /// Whether an object already exists under `key`
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Store `body` under `key`, replacing any previous object
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str)
        -> StorageResult<StoredObject>;

    /// Local path an object would occupy, if the backend is on local disk
    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// MIME type for a document extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "htm" | "html" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Reject keys that could escape the storage root
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && !key.contains('\\')
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if safe {
        Ok(())
    } else {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
        })
    }
}
