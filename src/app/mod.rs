//! Core application logic for Filing Fetcher
//!
//! This module contains the search client, resolver, download engine,
//! result aggregation and the storage adapters they run against.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use filing_fetcher::app::{
//!     ClientConfig, EngineConfig, FilesystemStore, Pipeline, RateLimitedClient, ScrapeRequest,
//!     SearchConfig, SqliteFilingStore,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Arc::new(RateLimitedClient::new(&ClientConfig::default())?);
//! let store = Arc::new(SqliteFilingStore::open("data/filings.db")?);
//! let objects = Arc::new(FilesystemStore::new("data/filings"));
//! let pipeline = Pipeline::new(
//!     fetcher,
//!     store,
//!     objects,
//!     SearchConfig::default(),
//!     EngineConfig::default(),
//! );
//!
//! let scraped = pipeline.scrape(ScrapeRequest::default()).await?;
//! let summary = pipeline.download(scraped.filings, CancellationToken::new()).await?;
//! println!("{} of {} filings stored", summary.successful, summary.total_filings);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod client;
pub mod engine;
pub mod manifest;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod signals;
pub mod status;
pub mod storage;
pub mod store;

// Re-export main public API
pub use aggregator::{AggregateSummary, ResultAggregator};
pub use client::{ClientConfig, FetchResponse, Fetcher, RateLimitedClient, SearchClient, SearchConfig};
pub use engine::{BatchResult, DownloadEngine, DownloadProgress, EngineConfig, ItemResult};
pub use manifest::{read_manifest, write_manifest, ManifestLoad};
pub use models::{Company, Exchange, Filing, FilingDescriptor, FilingKey, Language, Market};
pub use pipeline::{DownloadSummary, Pipeline, ScrapeRequest, ScrapeResult};
pub use resolver::{FilingResolver, ResolveReport};
pub use signals::{shutdown_token, SignalHandler};
pub use status::{Outcome, ProcessingStatus};
pub use storage::{FilesystemStore, ObjectStore, S3Store};
pub use store::{FilingStore, MemoryFilingStore, SqliteFilingStore, StatusUpdate};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(EngineConfig::default().retry_attempts, 3);
    }
}
