//! Concurrent download engine
//!
//! A batch is processed by `concurrency` tokio workers that pull the next
//! descriptor index from a shared counter. Results are collected back into
//! input order, and any descriptor that never produced a result (cancelled
//! before it was pulled, or lost to a panicking worker) is filled in as a
//! failure so a batch always reports one item per descriptor.

pub mod config;
pub mod core;
pub mod retry;
pub mod types;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use self::core::ItemPipeline;
pub use retry::{classify_status, FetchClass, RetryPolicy};
pub use types::{BatchResult, DownloadProgress, ItemResult};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::app::client::Fetcher;
use crate::app::models::FilingDescriptor;
use crate::app::status::ProcessingStatus;
use crate::app::storage::ObjectStore;
use crate::app::store::FilingStore;
use crate::errors::Result;

/// Downloads descriptor batches into object storage
pub struct DownloadEngine {
    fetcher: Arc<dyn Fetcher>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn FilingStore>,
    config: EngineConfig,
    progress_tx: Option<mpsc::Sender<DownloadProgress>>,
}

impl DownloadEngine {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn FilingStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            fetcher,
            objects,
            store,
            config,
            progress_tx: None,
        }
    }

    /// Send a [`DownloadProgress`] event after every finished item
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<DownloadProgress>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Download every descriptor, returning one result per descriptor
    ///
    /// Fails only when a backend is unreachable before any work starts.
    pub async fn download_batch(
        &self,
        descriptors: Vec<FilingDescriptor>,
        cancel: CancellationToken,
    ) -> Result<BatchResult> {
        let start = Instant::now();

        self.objects.ping().await?;
        self.store.ping().await?;

        let total = descriptors.len();
        if total == 0 {
            return Ok(BatchResult::from_items(Vec::new(), start.elapsed()));
        }

        let worker_count = self.config.concurrency.clamp(1, total);
        info!(
            "Downloading {} filings with {} workers into {}",
            total,
            worker_count,
            self.objects.describe()
        );

        let descriptors = Arc::new(descriptors);
        let pipeline = Arc::new(ItemPipeline::new(
            self.fetcher.clone(),
            self.objects.clone(),
            self.store.clone(),
            self.config.clone(),
        ));
        let next_index = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let descriptors = descriptors.clone();
            let pipeline = pipeline.clone();
            let next_index = next_index.clone();
            let completed = completed.clone();
            let cancel = cancel.clone();
            let progress_tx = self.progress_tx.clone();

            handles.push(tokio::spawn(async move {
                let mut results = Vec::new();
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let index = next_index.fetch_add(1, Ordering::SeqCst);
                    let Some(descriptor) = descriptors.get(index) else {
                        break;
                    };

                    debug!("Worker {} processing {}", worker_id, descriptor.filing_key());
                    let result = pipeline.process(descriptor.clone(), &cancel).await;
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

                    if let Some(tx) = &progress_tx {
                        let event = DownloadProgress {
                            completed: done,
                            total,
                            item: result.clone(),
                        };
                        // Receiver may have gone away; downloads continue regardless
                        let _ = tx.send(event).await;
                    }

                    results.push((index, result));
                }
                debug!("Worker {} finished", worker_id);
                results
            }));
        }

        let mut slots: Vec<Option<ItemResult>> = vec![None; total];
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(results) => {
                    for (index, result) in results {
                        slots[index] = Some(result);
                    }
                }
                Err(e) => error!("Download worker {} panicked: {}", worker_id, e),
            }
        }

        let cancelled = cancel.is_cancelled();
        let items: Vec<ItemResult> = slots
            .into_iter()
            .zip(descriptors.iter())
            .map(|(slot, descriptor)| match slot {
                Some(result) => result,
                None if cancelled => ItemResult::cancelled(descriptor.clone(), 0),
                None => ItemResult::failed(
                    descriptor.clone(),
                    ProcessingStatus::Failed,
                    "download worker terminated unexpectedly",
                    0,
                ),
            })
            .collect();

        let batch = BatchResult::from_items(items, start.elapsed());
        info!(
            "Batch finished: {} ok ({} skipped), {} failed in {:?}",
            batch.successful, batch.skipped, batch.failed, batch.duration
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::testing::{Reply, ScriptedFetcher};
    use crate::app::client::{FetchResponse, RateLimitedClient};
    use crate::app::models::{Exchange, Filing};
    use crate::app::storage::{FilesystemStore, StoredObject};
    use crate::app::store::MemoryFilingStore;
    use crate::errors::{FetchResult, StorageError, StorageResult};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn descriptor(id: &str, ext: &str) -> FilingDescriptor {
        FilingDescriptor::new(
            Exchange::Hkex,
            id,
            format!("https://files.test/{}.{}", id, ext),
            "00700",
            ext,
            Utc.with_ymd_and_hms(2024, 3, 15, 1, 30, 0).unwrap(),
        )
    }

    fn url(id: &str) -> String {
        format!("https://files.test/{}.pdf", id)
    }

    fn fast_config() -> EngineConfig {
        EngineConfigBuilder::new()
            .concurrency(3)
            .retry_attempts(3)
            .retry_delay(Duration::from_millis(1))
            .jitter(Duration::ZERO, Duration::ZERO)
            .request_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    struct Harness {
        temp: TempDir,
        fetcher: Arc<ScriptedFetcher>,
        objects: Arc<FilesystemStore>,
        store: Arc<MemoryFilingStore>,
    }

    impl Harness {
        fn new(fetcher: ScriptedFetcher) -> Self {
            let temp = TempDir::new().unwrap();
            let objects = Arc::new(FilesystemStore::new(temp.path()));
            Self {
                temp,
                fetcher: Arc::new(fetcher),
                objects,
                store: Arc::new(MemoryFilingStore::new()),
            }
        }

        fn engine(&self, config: EngineConfig) -> DownloadEngine {
            DownloadEngine::new(
                self.fetcher.clone(),
                self.objects.clone(),
                self.store.clone(),
                config,
            )
        }
    }

    /// Object store whose uploads always fail
    struct BrokenBucket;

    #[async_trait]
    impl ObjectStore for BrokenBucket {
        async fn ping(&self) -> StorageResult<()> {
            Ok(())
        }

        async fn exists(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }

        async fn put(&self, key: &str, _body: Vec<u8>, _ct: &str) -> StorageResult<StoredObject> {
            Err(StorageError::Upload {
                key: key.to_string(),
                reason: "bucket is read-only".to_string(),
            })
        }

        fn describe(&self) -> String {
            "broken bucket".to_string()
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_outcomes() {
        let fetcher = ScriptedFetcher::new()
            .script(&url("1"), vec![Reply::ok(b"%PDF-1".to_vec())])
            .script(&url("2"), vec![Reply::status(404)])
            .script(&url("3"), vec![Reply::status(429)])
            .script(&url("4"), vec![Reply::Hang]);
        let harness = Harness::new(fetcher);
        let config = EngineConfigBuilder::new()
            .concurrency(4)
            .retry_attempts(3)
            .retry_delay(Duration::from_millis(1))
            .jitter(Duration::ZERO, Duration::ZERO)
            .request_timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let engine = harness.engine(config);

        let batch = engine
            .download_batch(
                vec![
                    descriptor("1", "pdf"),
                    descriptor("2", "pdf"),
                    descriptor("3", "pdf"),
                    descriptor("4", "pdf"),
                ],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(batch.total, 4);
        assert_eq!(batch.successful, 1);
        assert_eq!(batch.failed, 3);

        let statuses: Vec<_> = batch.items.iter().map(|item| item.status).collect();
        assert_eq!(
            statuses,
            vec![
                ProcessingStatus::Completed,
                ProcessingStatus::UrlFailure,
                ProcessingStatus::RateLimited,
                ProcessingStatus::Failed,
            ]
        );

        let stored = &batch.items[0];
        assert_eq!(
            stored.storage_key.as_deref(),
            Some("hkex/00700/2024/03/15/1.pdf")
        );
        assert_eq!(
            stored.content_md5.as_deref(),
            Some(format!("{:x}", md5::compute(b"%PDF-1")).as_str())
        );
        let on_disk = harness.temp.path().join("hkex/00700/2024/03/15/1.pdf");
        assert_eq!(std::fs::read(on_disk).unwrap(), b"%PDF-1");

        // 404 is never retried, the others use the full budget
        assert_eq!(harness.fetcher.calls_to(&url("2")), 1);
        assert_eq!(harness.fetcher.calls_to(&url("3")), 3);
        assert_eq!(harness.fetcher.calls_to(&url("4")), 3);

        let timed_out = &batch.items[3];
        assert_eq!(timed_out.attempts, 3);
        assert!(timed_out
            .error
            .as_deref()
            .is_some_and(|e| e.contains("timed out")));
    }

    /// Grants a request slot only after `turn` has passed
    struct SlowTurnFetcher {
        turn: Duration,
        inner: ScriptedFetcher,
    }

    #[async_trait]
    impl Fetcher for SlowTurnFetcher {
        async fn wait_turn(&self) {
            tokio::time::sleep(self.turn).await;
        }

        async fn send(&self, url: &str) -> FetchResult<FetchResponse> {
            self.inner.send(url).await
        }
    }

    fn single_attempt(request_timeout: Duration) -> EngineConfig {
        EngineConfigBuilder::new()
            .concurrency(1)
            .retry_attempts(1)
            .request_timeout(request_timeout)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_limiter_wait_does_not_count_against_request_timeout() {
        let temp = TempDir::new().unwrap();
        let fetcher = SlowTurnFetcher {
            turn: Duration::from_millis(300),
            inner: ScriptedFetcher::new().in_order(vec![Reply::ok(b"%PDF".to_vec())]),
        };
        let engine = DownloadEngine::new(
            Arc::new(fetcher),
            Arc::new(FilesystemStore::new(temp.path())),
            Arc::new(MemoryFilingStore::new()),
            single_attempt(Duration::from_millis(100)),
        );

        let batch = engine
            .download_batch(vec![descriptor("1", "pdf")], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(batch.successful, 1);
        assert_eq!(batch.items[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_rate_limited_client_reports_transport_error_after_waiting() {
        let temp = TempDir::new().unwrap();
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        let client = RateLimitedClient::with_client(http, 0.5, Duration::from_secs(5)).unwrap();
        // Use up the only slot so the next request waits about two seconds
        client.wait_turn().await;

        let closed_port = FilingDescriptor::new(
            Exchange::Hkex,
            "1",
            "http://127.0.0.1:9/1.pdf",
            "00700",
            "pdf",
            Utc.with_ymd_and_hms(2024, 3, 15, 1, 30, 0).unwrap(),
        );
        let engine = DownloadEngine::new(
            Arc::new(client),
            Arc::new(FilesystemStore::new(temp.path())),
            Arc::new(MemoryFilingStore::new()),
            single_attempt(Duration::from_millis(500)),
        );

        let batch = engine
            .download_batch(vec![closed_port], CancellationToken::new())
            .await
            .unwrap();

        let item = &batch.items[0];
        assert_eq!(item.status, ProcessingStatus::Failed);
        assert_eq!(item.attempts, 1);
        let error = item.error.as_deref().unwrap_or_default();
        assert!(!error.is_empty());
        assert!(!error.contains("timed out"), "unexpected error: {}", error);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let fetcher = ScriptedFetcher::new().script(
            &url("1"),
            vec![
                Reply::Transport("connection reset".into()),
                Reply::status(503),
                Reply::ok(b"body".to_vec()),
            ],
        );
        let harness = Harness::new(fetcher);
        let batch = harness
            .engine(fast_config())
            .download_batch(vec![descriptor("1", "pdf")], CancellationToken::new())
            .await
            .unwrap();

        let item = &batch.items[0];
        assert!(item.success);
        assert_eq!(item.attempts, 3);
        assert_eq!(harness.fetcher.calls_to(&url("1")), 3);
    }

    #[tokio::test]
    async fn test_existing_objects_are_skipped() {
        let harness = Harness::new(ScriptedFetcher::new().in_order(vec![Reply::ok(b"new".to_vec())]));
        harness
            .objects
            .put("hkex/00700/2024/03/15/1.pdf", b"old".to_vec(), "application/pdf")
            .await
            .unwrap();

        let batch = harness
            .engine(fast_config())
            .download_batch(
                vec![descriptor("1", "pdf"), descriptor("2", "pdf")],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.successful, 2);
        assert!(batch.items[0].skipped);
        assert_eq!(batch.items[0].attempts, 0);
        assert!(batch.items[0].local_path.is_some());
        assert_eq!(harness.fetcher.calls(), vec![url("2")]);
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_not_fetched() {
        let harness = Harness::new(ScriptedFetcher::new());
        let batch = harness
            .engine(fast_config())
            .download_batch(vec![descriptor("9", "xls")], CancellationToken::new())
            .await
            .unwrap();

        let item = &batch.items[0];
        assert_eq!(item.status, ProcessingStatus::Failed);
        assert!(item.error.as_deref().unwrap().contains("unsupported"));
        assert!(harness.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported_as_storage_error() {
        let fetcher = Arc::new(ScriptedFetcher::new().in_order(vec![Reply::ok(b"x".to_vec())]));
        let engine = DownloadEngine::new(
            fetcher,
            Arc::new(BrokenBucket),
            Arc::new(MemoryFilingStore::new()),
            fast_config(),
        );

        let batch = engine
            .download_batch(vec![descriptor("1", "pdf")], CancellationToken::new())
            .await
            .unwrap();

        let item = &batch.items[0];
        assert_eq!(item.status, ProcessingStatus::Failed);
        assert!(item.is_storage_failure());
        assert_eq!(item.attempts, 1);
    }

    #[tokio::test]
    async fn test_cancellation_accounts_for_every_descriptor() {
        let harness = Harness::new(ScriptedFetcher::new().in_order(vec![Reply::Hang]));
        let config = EngineConfigBuilder::new()
            .concurrency(1)
            .build()
            .unwrap();
        let engine = Arc::new(harness.engine(config));
        let cancel = CancellationToken::new();

        let task = {
            let engine = engine.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                engine
                    .download_batch(
                        vec![
                            descriptor("1", "pdf"),
                            descriptor("2", "pdf"),
                            descriptor("3", "pdf"),
                        ],
                        cancel,
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let batch = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(batch.total, 3);
        assert_eq!(batch.failed, 3);
        assert!(batch.items.iter().all(ItemResult::is_cancelled));
        assert_eq!(harness.fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_events_and_processing_mark() {
        let harness = Harness::new(ScriptedFetcher::new().in_order(vec![Reply::ok(b"x".to_vec())]));
        let pending = Filing::from_descriptor(&descriptor("1", "pdf"));
        harness.store.upsert_filing(&pending).await.unwrap();

        let config = EngineConfigBuilder::new()
            .concurrency(2)
            .mark_processing(true)
            .build()
            .unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let engine = harness.engine(config).with_progress(tx);

        let batch = engine
            .download_batch(
                vec![descriptor("1", "pdf"), descriptor("2", "pdf")],
                CancellationToken::new(),
            )
            .await
            .unwrap();
        drop(engine);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.total == 2));
        assert_eq!(events.iter().map(|e| e.completed).max(), Some(2));
        assert_eq!(batch.successful, 2);

        // The engine marks but never finalizes statuses
        let stored = harness
            .store
            .get_filing(&descriptor("1", "pdf").filing_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let harness = Harness::new(ScriptedFetcher::new());
        let batch = harness
            .engine(fast_config())
            .download_batch(Vec::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(batch.total, 0);
        assert!(batch.items.is_empty());
    }
}
