//! Per-item and per-batch download results

use std::time::Duration;

use serde::Serialize;

use crate::app::models::{FilingDescriptor, FilingKey};
use crate::app::status::ProcessingStatus;

/// Error text for items abandoned because the batch was cancelled
pub const CANCELLED: &str = "cancelled";

/// Prefix that separates storage failures from fetch failures
pub const STORAGE_ERROR_PREFIX: &str = "storage:";

/// Outcome of one descriptor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemResult {
    pub filing_key: FilingKey,
    #[serde(skip)]
    pub descriptor: FilingDescriptor,
    pub success: bool,
    /// Object already existed; nothing was fetched
    pub skipped: bool,
    /// Terminal status to record
    pub status: ProcessingStatus,
    pub storage_key: Option<String>,
    pub local_path: Option<String>,
    pub error: Option<String>,
    /// Fetch attempts made
    pub attempts: u32,
    pub content_md5: Option<String>,
}

impl ItemResult {
    fn base(descriptor: FilingDescriptor, status: ProcessingStatus, attempts: u32) -> Self {
        Self {
            filing_key: descriptor.filing_key(),
            descriptor,
            success: status == ProcessingStatus::Completed,
            skipped: false,
            status,
            storage_key: None,
            local_path: None,
            error: None,
            attempts,
            content_md5: None,
        }
    }

    pub fn succeeded(
        descriptor: FilingDescriptor,
        storage_key: String,
        local_path: Option<String>,
        content_md5: String,
        attempts: u32,
    ) -> Self {
        Self {
            storage_key: Some(storage_key),
            local_path,
            content_md5: Some(content_md5),
            ..Self::base(descriptor, ProcessingStatus::Completed, attempts)
        }
    }

    pub fn skipped(descriptor: FilingDescriptor, local_path: Option<String>) -> Self {
        let storage_key = descriptor.storage_key();
        Self {
            skipped: true,
            storage_key: Some(storage_key),
            local_path,
            ..Self::base(descriptor, ProcessingStatus::Completed, 0)
        }
    }

    pub fn failed(
        descriptor: FilingDescriptor,
        status: ProcessingStatus,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(descriptor, status, attempts)
        }
    }

    pub fn cancelled(descriptor: FilingDescriptor, attempts: u32) -> Self {
        Self::failed(descriptor, ProcessingStatus::Failed, CANCELLED, attempts)
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_deref() == Some(CANCELLED)
    }

    pub fn is_storage_failure(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.starts_with(STORAGE_ERROR_PREFIX))
    }
}

/// Outcome of one `download_batch` call, items in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    /// Items stored or already present
    pub successful: usize,
    pub failed: usize,
    /// Successful items that needed no fetch
    pub skipped: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub items: Vec<ItemResult>,
}

impl BatchResult {
    pub fn from_items(items: Vec<ItemResult>, duration: Duration) -> Self {
        let successful = items.iter().filter(|item| item.success).count();
        let skipped = items.iter().filter(|item| item.skipped).count();
        Self {
            total: items.len(),
            successful,
            failed: items.len() - successful,
            skipped,
            duration,
            items,
        }
    }

    pub fn count_status(&self, status: ProcessingStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Progress event sent after each finished item
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub completed: usize,
    pub total: usize,
    pub item: ItemResult,
}
