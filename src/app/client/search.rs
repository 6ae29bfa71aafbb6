//! HKEX title search client
//!
//! The title search endpoint silently truncates large windows and its paging
//! is only reliable when growing `rowRange` over a short window. Queries are
//! therefore split into month-aligned chunks, and each chunk is paged
//! sequentially by asking for `rows_so_far + page_size` rows; the server
//! answers cumulatively and only the rows beyond those already collected are
//! kept.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use super::Fetcher;
use crate::app::models::{Market, RawAnnouncement};
use crate::constants::hkex;
use crate::errors::{SearchError, SearchResult};

/// Search endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Title search servlet URL
    pub search_url: String,
    /// Rows added to `rowRange` per page
    pub page_size: u64,
    /// Safety cap on pages requested for one month chunk
    pub max_pages_per_chunk: u32,
    /// Result language (`E` or `ZH`)
    pub language: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_url: hkex::SEARCH_URL.to_string(),
            page_size: hkex::DEFAULT_PAGE_SIZE,
            max_pages_per_chunk: hkex::MAX_PAGES_PER_CHUNK,
            language: "E".to_string(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.page_size == 0 {
            errors.push("page_size must be greater than zero".to_string());
        }
        if self.max_pages_per_chunk == 0 {
            errors.push("max_pages_per_chunk must be greater than zero".to_string());
        }
        if Url::parse(&self.search_url).is_err() {
            errors.push(format!("search_url is not a valid URL: {}", self.search_url));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Inclusive date window inside a single calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateChunk {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Split `[from, to]` into month-aligned inclusive windows
///
/// `from > to` yields no chunks.
pub fn month_chunks(from: NaiveDate, to: NaiveDate) -> Vec<DateChunk> {
    let mut chunks = Vec::new();
    let mut cursor = from;

    while cursor <= to {
        let end = last_day_of_month(cursor).unwrap_or(to).min(to);
        chunks.push(DateChunk { start: cursor, end });
        match end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    chunks
}

fn last_day_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}

/// One page of the title search response
#[derive(Debug, Deserialize)]
struct SearchPage {
    /// JSON-encoded row array, or null/empty
    #[serde(default)]
    result: Option<String>,
    #[serde(rename = "hasNextRow", default)]
    has_next_row: bool,
    #[serde(rename = "loadedRecord", default)]
    loaded_record: Option<u64>,
    #[serde(rename = "recordCnt", default)]
    record_count: Option<u64>,
}

impl SearchPage {
    fn rows(&self) -> SearchResult<Vec<RawAnnouncement>> {
        let result = match self.result.as_deref().map(str::trim) {
            None | Some("") | Some("null") => return Ok(Vec::new()),
            Some(result) => result,
        };
        serde_json::from_str(result).map_err(|e| SearchError::InvalidResponse {
            reason: format!("result rows: {}", e),
        })
    }

    /// `loadedRecord` when it disagrees with the number of rows returned
    fn loaded_mismatch(&self, returned: usize) -> Option<u64> {
        self.loaded_record
            .filter(|&loaded| loaded != returned as u64)
    }
}

/// Paginated, month-chunked search over the exchange title search endpoint
pub struct SearchClient {
    fetcher: Arc<dyn Fetcher>,
    config: SearchConfig,
}

impl SearchClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: SearchConfig) -> Self {
        Self { fetcher, config }
    }

    /// Fetch every announcement published between `from` and `to` inclusive
    ///
    /// Chunk results are concatenated in discovery order without
    /// deduplication. Any page failure fails the whole call.
    pub async fn search_by_date_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        market: Market,
    ) -> SearchResult<Vec<RawAnnouncement>> {
        let chunks = month_chunks(from, to);
        info!(
            "Searching {} announcements {} to {} in {} chunk(s)",
            market,
            from,
            to,
            chunks.len()
        );

        let mut announcements = Vec::new();
        for chunk in chunks {
            let rows = self.search_chunk(chunk, market).await?;
            info!(
                "Chunk {} to {}: {} announcements",
                chunk.start,
                chunk.end,
                rows.len()
            );
            announcements.extend(rows);
        }

        Ok(announcements)
    }

    async fn search_chunk(
        &self,
        chunk: DateChunk,
        market: Market,
    ) -> SearchResult<Vec<RawAnnouncement>> {
        let mut rows: Vec<RawAnnouncement> = Vec::new();
        let mut pages = 0u32;

        loop {
            if pages >= self.config.max_pages_per_chunk {
                warn!(
                    "Stopping chunk {} to {} after {} pages with {} rows",
                    chunk.start,
                    chunk.end,
                    pages,
                    rows.len()
                );
                break;
            }

            let row_range = rows.len() as u64 + self.config.page_size;
            let page = self.fetch_page(chunk, market, row_range).await?;
            pages += 1;

            let before = rows.len();
            let page_rows = page.rows()?;
            if let Some(loaded) = page.loaded_mismatch(page_rows.len()) {
                warn!(
                    "Page {} of {} to {} reports loadedRecord={} but returned {} rows",
                    pages,
                    chunk.start,
                    chunk.end,
                    loaded,
                    page_rows.len()
                );
            }
            if page_rows.len() > before {
                rows.extend(page_rows.into_iter().skip(before));
            }
            let added = rows.len() - before;

            debug!(
                "Page {} (rowRange={}): +{} rows, loaded={:?}, count={:?}, next={}",
                pages, row_range, added, page.loaded_record, page.record_count, page.has_next_row
            );

            if !page.has_next_row || added == 0 {
                break;
            }
            let advisory_total = rows.first().and_then(RawAnnouncement::advisory_total);
            if advisory_total.is_some_and(|total| total > 0 && rows.len() as u64 >= total) {
                break;
            }
        }

        Ok(rows)
    }

    fn page_url(&self, chunk: DateChunk, market: Market, row_range: u64) -> SearchResult<Url> {
        let from = chunk.start.format("%Y%m%d").to_string();
        let to = chunk.end.format("%Y%m%d").to_string();
        let row_range = row_range.to_string();
        let params = [
            ("sortDir", "0"),
            ("sortByOptions", "DateTime"),
            ("category", "0"),
            ("market", market.as_query()),
            ("stockId", "-1"),
            ("documentType", "-1"),
            ("fromDate", from.as_str()),
            ("toDate", to.as_str()),
            ("title", ""),
            ("searchType", "0"),
            ("t1code", "-2"),
            ("t2Gcode", "-2"),
            ("t2code", "-2"),
            ("rowRange", row_range.as_str()),
            ("lang", self.config.language.as_str()),
        ];

        Url::parse_with_params(&self.config.search_url, params).map_err(|e| {
            SearchError::InvalidUrl {
                url: self.config.search_url.clone(),
                reason: e.to_string(),
            }
        })
    }

    async fn fetch_page(
        &self,
        chunk: DateChunk,
        market: Market,
        row_range: u64,
    ) -> SearchResult<SearchPage> {
        let url = self.page_url(chunk, market, row_range)?;
        let response = self.fetcher.fetch(url.as_str()).await?;

        if !response.is_success() {
            return Err(SearchError::UnexpectedStatus {
                status: response.status,
                url: url.to_string(),
            });
        }

        serde_json::from_slice(&response.body).map_err(|e| SearchError::InvalidResponse {
            reason: e.to_string(),
        })
    }
}
