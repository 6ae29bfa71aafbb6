//! Scrape and download entry points
//!
//! [`Pipeline`] wires the search client, resolver, download engine and
//! aggregator together so callers (the CLI, a scheduler) only deal with a
//! request in and a serializable summary out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::aggregator::ResultAggregator;
use crate::app::client::{Fetcher, SearchClient, SearchConfig};
use crate::app::engine::{DownloadEngine, DownloadProgress, EngineConfig, ItemResult};
use crate::app::models::{FilingDescriptor, Market};
use crate::app::resolver::FilingResolver;
use crate::app::storage::ObjectStore;
use crate::app::store::FilingStore;
use crate::errors::{ConfigError, ConfigResult, Result};

/// Date window and market to scrape
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub market: Option<Market>,
}

impl ScrapeRequest {
    /// Inclusive date window relative to `today`
    ///
    /// No dates means yesterday through today. A single date stands for a
    /// one-day window.
    pub fn date_range(&self, today: NaiveDate) -> ConfigResult<(NaiveDate, NaiveDate)> {
        let (start, end) = match (self.start_date, self.end_date) {
            (None, None) => (today.checked_sub_days(Days::new(1)).unwrap_or(today), today),
            (Some(start), None) => (start, start),
            (None, Some(end)) => (end, end),
            (Some(start), Some(end)) => (start, end),
        };

        if start > end {
            return Err(ConfigError::InvalidValue {
                field: "start_date".to_string(),
                value: start.to_string(),
                reason: format!("start date is after end date {}", end),
            });
        }
        Ok((start, end))
    }
}

/// Outcome of a scrape run
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub market: Market,
    pub total_announcements: usize,
    pub new_filings: usize,
    pub updated_filings: usize,
    pub skipped: usize,
    pub unsupported: usize,
    pub errors: usize,
    /// Download work for newly discovered filings
    pub filings: Vec<FilingDescriptor>,
}

/// Outcome of a download run after statuses were recorded
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSummary {
    pub total_filings: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub transient_failures: usize,
    pub url_failures: usize,
    pub rate_limited: usize,
    pub write_errors: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub failures: Vec<ItemResult>,
}

/// End-to-end scrape and download orchestration
pub struct Pipeline {
    search: SearchClient,
    resolver: FilingResolver,
    engine: DownloadEngine,
    aggregator: ResultAggregator,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn FilingStore>,
        objects: Arc<dyn ObjectStore>,
        search_config: SearchConfig,
        engine_config: EngineConfig,
    ) -> Self {
        Self {
            search: SearchClient::new(fetcher.clone(), search_config),
            resolver: FilingResolver::new(store.clone()),
            engine: DownloadEngine::new(fetcher, objects, store.clone(), engine_config),
            aggregator: ResultAggregator::new(store),
        }
    }

    /// Forward per-item download progress to `progress_tx`
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<DownloadProgress>) -> Self {
        self.engine = self.engine.with_progress(progress_tx);
        self
    }

    /// Search the window, resolve rows, and return descriptors for new filings
    pub async fn scrape(&self, request: ScrapeRequest) -> Result<ScrapeResult> {
        let (start_date, end_date) = request.date_range(Utc::now().date_naive())?;
        let market = request.market.unwrap_or_default();

        let announcements = self
            .search
            .search_by_date_range(start_date, end_date, market)
            .await?;
        let total_announcements = announcements.len();
        let report = self.resolver.resolve(announcements).await?;

        info!(
            "Scrape {} to {} ({}) found {} new filings in {} announcements",
            start_date, end_date, market, report.new_filings, total_announcements
        );

        Ok(ScrapeResult {
            start_date,
            end_date,
            market,
            total_announcements,
            new_filings: report.new_filings,
            updated_filings: report.updated_filings,
            skipped: report.skipped,
            unsupported: report.unsupported,
            errors: report.errors,
            filings: report.descriptors,
        })
    }

    /// Download descriptors and record every outcome
    pub async fn download(
        &self,
        descriptors: Vec<FilingDescriptor>,
        cancel: CancellationToken,
    ) -> Result<DownloadSummary> {
        let batch = self.engine.download_batch(descriptors, cancel).await?;
        let aggregate = self.aggregator.apply(&batch).await?;

        Ok(DownloadSummary {
            total_filings: batch.total,
            successful: batch.successful,
            failed: batch.failed,
            skipped: batch.skipped,
            transient_failures: aggregate.transient_failures,
            url_failures: aggregate.url_failures,
            rate_limited: aggregate.rate_limited,
            write_errors: aggregate.write_errors,
            duration: batch.duration,
            failures: batch.items.into_iter().filter(|item| !item.success).collect(),
        })
    }
}
