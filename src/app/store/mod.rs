//! Tracking store for companies and filings
//!
//! The store is the durable record of what has been discovered and how far
//! each filing got. Filings are keyed by `(exchange, source_id)`; upserts
//! refresh content fields only and leave the processing columns alone, which
//! are written exclusively through [`FilingStore::update_status`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::models::{Company, Exchange, Filing, FilingKey};
use crate::app::status::ProcessingStatus;
use crate::errors::StoreResult;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryFilingStore;
pub use sqlite::SqliteFilingStore;

/// Processing columns written after a download attempt
///
/// `error` always replaces the stored error (`None` clears it). The
/// remaining optional fields only overwrite when present.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ProcessingStatus,
    pub error: Option<String>,
    pub storage_key: Option<String>,
    pub local_path: Option<String>,
    pub content_md5: Option<String>,
    pub ingested_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    /// Status change with no artifacts
    pub fn status(status: ProcessingStatus) -> Self {
        Self {
            status,
            error: None,
            storage_key: None,
            local_path: None,
            content_md5: None,
            ingested_at: None,
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

/// Persistent metadata store
#[async_trait]
pub trait FilingStore: Send + Sync {
    /// Verify the store can serve requests
    async fn ping(&self) -> StoreResult<()>;

    async fn get_company(&self, exchange: Exchange, id: &str) -> StoreResult<Option<Company>>;

    /// Insert a company, or refresh only its name fields
    async fn upsert_company(&self, company: &Company) -> StoreResult<()>;

    async fn get_filing(&self, key: &FilingKey) -> StoreResult<Option<Filing>>;

    /// Insert a filing, or refresh content fields of an existing one
    ///
    /// Status, error, storage key, local path, checksum and ingestion time
    /// of an existing filing are never touched.
    async fn upsert_filing(&self, filing: &Filing) -> StoreResult<()>;

    /// Write processing columns; returns `false` if the filing does not exist
    async fn update_status(&self, key: &FilingKey, update: &StatusUpdate) -> StoreResult<bool>;

    /// Number of filings per status, including statuses with zero filings
    async fn count_by_status(&self) -> StoreResult<BTreeMap<ProcessingStatus, u64>>;

    /// Filings currently in `status`, oldest report date first
    async fn filings_with_status(
        &self,
        status: ProcessingStatus,
        limit: usize,
    ) -> StoreResult<Vec<Filing>>;
}

pub(crate) fn empty_status_counts() -> BTreeMap<ProcessingStatus, u64> {
    ProcessingStatus::ALL
        .into_iter()
        .map(|status| (status, 0))
        .collect()
}
