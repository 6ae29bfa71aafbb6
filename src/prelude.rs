//! Prelude module for Filing Fetcher Library
//!
//! Re-exports the types most integrations need, so a single
//! `use filing_fetcher::prelude::*;` covers wiring a pipeline.
//!
//! # Usage
//!
//! ```rust,no_run
//! use filing_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::default();
//!     let pipeline = Pipeline::new(
//!         Arc::new(RateLimitedClient::new(&config.client)?),
//!         Arc::new(SqliteFilingStore::open(&config.store.database_path)?),
//!         Arc::new(FilesystemStore::new(config.storage.root.clone())),
//!         config.search.clone(),
//!         config.engine.clone(),
//!     );
//!
//!     let scraped = pipeline.scrape(ScrapeRequest::default()).await?;
//!     pipeline.download(scraped.filings, shutdown_token()).await?;
//!     Ok(())
//! }
//! ```

pub use crate::errors::{AppError, Result};

pub use crate::app::{
    shutdown_token, BatchResult, ClientConfig, DownloadEngine, DownloadSummary, EngineConfig,
    Exchange, FilesystemStore, Filing, FilingDescriptor, FilingKey, FilingStore, ItemResult,
    Market, MemoryFilingStore, ObjectStore, Pipeline, ProcessingStatus, RateLimitedClient,
    S3Store, ScrapeRequest, ScrapeResult, SearchConfig, SqliteFilingStore,
};

pub use crate::config::AppConfig;

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;
pub use tokio_util::sync::CancellationToken;
