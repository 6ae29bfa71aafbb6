//! End-to-end scrape and download against an in-process exchange

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use filing_fetcher::app::engine::EngineConfigBuilder;
use filing_fetcher::app::{
    read_manifest, write_manifest, Exchange, FetchResponse, Fetcher, FilesystemStore, FilingKey,
    FilingStore, MemoryFilingStore, Pipeline, ProcessingStatus, ScrapeRequest, SearchConfig,
};
use filing_fetcher::constants::hkex;
use filing_fetcher::errors::FetchResult;

/// Serves one search page and fixed document responses
struct FakeExchange {
    documents: HashMap<String, u16>,
    hits: Mutex<HashMap<String, usize>>,
    searches: AtomicUsize,
}

impl FakeExchange {
    fn new(documents: &[(&str, u16)]) -> Self {
        Self {
            documents: documents
                .iter()
                .map(|(link, status)| (format!("{}{}", hkex::BASE_URL, link), *status))
                .collect(),
            hits: Mutex::new(HashMap::new()),
            searches: AtomicUsize::new(0),
        }
    }

    fn hits(&self, link: &str) -> usize {
        let url = format!("{}{}", hkex::BASE_URL, link);
        self.hits.lock().unwrap().get(&url).copied().unwrap_or(0)
    }

    fn search_page() -> Vec<u8> {
        let rows = json!([
            {
                "NEWS_ID": "101",
                "STOCK_CODE": "00700",
                "STOCK_NAME": "TENCENT",
                "TITLE": "Annual Results",
                "FILE_LINK": "/listedco/101.pdf",
                "DATE_TIME": "15/03/2024 17:05",
                "LONG_TEXT": "Financial Statements - [Final Results]",
                "TOTAL_COUNT": "3"
            },
            {
                "NEWS_ID": "102",
                "STOCK_CODE": "00005",
                "STOCK_NAME": "HSBC HOLDINGS",
                "TITLE": "Notice of Board Meeting",
                "FILE_LINK": "/listedco/102.pdf",
                "DATE_TIME": "15/03/2024 18:00",
                "TOTAL_COUNT": "3"
            },
            {
                "NEWS_ID": "103",
                "STOCK_CODE": "00941",
                "STOCK_NAME": "CHINA MOBILE",
                "TITLE": "Circular",
                "FILE_LINK": "/listedco/103.htm",
                "DATE_TIME": "15/03/2024 19:30",
                "TOTAL_COUNT": "3"
            }
        ]);
        json!({
            "result": rows.to_string(),
            "hasNextRow": false,
            "loadedRecord": 3,
            "recordCnt": 3,
        })
        .to_string()
        .into_bytes()
    }
}

#[async_trait]
impl Fetcher for FakeExchange {
    async fn send(&self, url: &str) -> FetchResult<FetchResponse> {
        if url.starts_with(hkex::SEARCH_URL) {
            self.searches.fetch_add(1, Ordering::SeqCst);
            return Ok(FetchResponse {
                status: 200,
                body: Self::search_page(),
            });
        }

        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let status = self.documents.get(url).copied().unwrap_or(404);
        let body = if status == 200 {
            format!("document at {}", url).into_bytes()
        } else {
            Vec::new()
        };
        Ok(FetchResponse { status, body })
    }
}

struct Setup {
    temp: TempDir,
    exchange: Arc<FakeExchange>,
    store: Arc<MemoryFilingStore>,
    pipeline: Pipeline,
}

fn setup() -> Setup {
    let temp = TempDir::new().unwrap();
    let exchange = Arc::new(FakeExchange::new(&[
        ("/listedco/101.pdf", 200),
        ("/listedco/102.pdf", 404),
        ("/listedco/103.htm", 500),
    ]));
    let store = Arc::new(MemoryFilingStore::new());
    let engine = EngineConfigBuilder::new()
        .concurrency(2)
        .retry_attempts(2)
        .retry_delay(Duration::from_millis(1))
        .jitter(Duration::ZERO, Duration::ZERO)
        .build()
        .unwrap();
    let pipeline = Pipeline::new(
        exchange.clone(),
        store.clone(),
        Arc::new(FilesystemStore::new(temp.path().join("objects"))),
        SearchConfig::default(),
        engine,
    );
    Setup {
        temp,
        exchange,
        store,
        pipeline,
    }
}

fn one_day() -> ScrapeRequest {
    let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
    ScrapeRequest {
        start_date: Some(day),
        end_date: Some(day),
        market: None,
    }
}

async fn status_of(store: &MemoryFilingStore, id: &str) -> ProcessingStatus {
    store
        .get_filing(&FilingKey::new(Exchange::Hkex, id))
        .await
        .unwrap()
        .unwrap()
        .processing_status
}

#[tokio::test]
async fn test_scrape_download_and_rerun() {
    let s = setup();

    let scraped = s.pipeline.scrape(one_day()).await.unwrap();
    assert_eq!(scraped.new_filings, 3);
    assert_eq!(scraped.filings.len(), 3);
    assert!(s.exchange.searches.load(Ordering::SeqCst) >= 1);

    let first = s
        .pipeline
        .download(scraped.filings.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.total_filings, 3);
    assert_eq!(first.successful, 1);
    assert_eq!(first.failed, 2);
    assert_eq!(first.url_failures, 1);
    assert_eq!(first.transient_failures, 1);
    assert_eq!(first.write_errors, 0);

    assert_eq!(status_of(&s.store, "101").await, ProcessingStatus::Completed);
    assert_eq!(status_of(&s.store, "102").await, ProcessingStatus::UrlFailure);
    assert_eq!(status_of(&s.store, "103").await, ProcessingStatus::Failed);

    // 404 is not retried; 500 uses both attempts
    assert_eq!(s.exchange.hits("/listedco/102.pdf"), 1);
    assert_eq!(s.exchange.hits("/listedco/103.htm"), 2);

    let stored = s
        .temp
        .path()
        .join("objects/hkex/00700/2024/03/15/101.pdf");
    assert!(stored.exists());

    let second = s
        .pipeline
        .download(scraped.filings, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(s.exchange.hits("/listedco/101.pdf"), 1);

    let counts = s.store.count_by_status().await.unwrap();
    assert_eq!(counts[&ProcessingStatus::Completed], 1);
    assert_eq!(counts[&ProcessingStatus::UrlFailure], 1);
    assert_eq!(counts[&ProcessingStatus::Failed], 1);
    assert_eq!(counts[&ProcessingStatus::Pending], 0);
}

#[tokio::test]
async fn test_second_scrape_finds_nothing_new() {
    let s = setup();

    let first = s.pipeline.scrape(one_day()).await.unwrap();
    let second = s.pipeline.scrape(one_day()).await.unwrap();

    assert_eq!(first.new_filings, 3);
    assert_eq!(second.new_filings, 0);
    assert_eq!(second.updated_filings, 3);
    assert!(second.filings.is_empty());
}

#[tokio::test]
async fn test_download_from_manifest() {
    let s = setup();
    let scraped = s.pipeline.scrape(one_day()).await.unwrap();

    let manifest = s.temp.path().join("manifests/2024-03-15.jsonl");
    write_manifest(&manifest, &scraped.filings).await.unwrap();
    let load = read_manifest(&manifest).await.unwrap();
    assert_eq!(load.malformed, 0);
    assert_eq!(load.descriptors, scraped.filings);

    let summary = s
        .pipeline
        .download(load.descriptors, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failures.len(), 2);
}

#[tokio::test]
async fn test_cancelled_download_leaves_filings_retriable() {
    let s = setup();
    let scraped = s.pipeline.scrape(one_day()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = s.pipeline.download(scraped.filings, cancel).await.unwrap();

    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed, 3);
    assert!(summary
        .failures
        .iter()
        .all(|item| item.error.as_deref() == Some("cancelled")));
    assert_eq!(status_of(&s.store, "101").await, ProcessingStatus::Failed);
}
