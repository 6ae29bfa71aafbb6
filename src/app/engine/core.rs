//! Per-item download pipeline
//!
//! Each descriptor goes through: existence check, extension check, optional
//! `PROCESSING` mark, fetch with retries, checksum, upload. Every exit path
//! produces exactly one [`ItemResult`]; nothing here returns an error.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::EngineConfig;
use super::retry::{classify_status, FetchClass, RetryPolicy};
use super::types::{ItemResult, STORAGE_ERROR_PREFIX};
use crate::app::client::Fetcher;
use crate::app::models::FilingDescriptor;
use crate::app::status::{Outcome, ProcessingStatus};
use crate::app::storage::{content_type_for, ObjectStore};
use crate::app::store::{FilingStore, StatusUpdate};

/// Result of the fetch loop before storage
enum Fetched {
    Body { body: Vec<u8>, attempts: u32 },
    Done(ItemResult),
}

/// Shared, stateless item processor used by every worker of a batch
pub struct ItemPipeline {
    fetcher: Arc<dyn Fetcher>,
    objects: Arc<dyn ObjectStore>,
    store: Arc<dyn FilingStore>,
    config: EngineConfig,
    policy: RetryPolicy,
}

impl ItemPipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn FilingStore>,
        config: EngineConfig,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            fetcher,
            objects,
            store,
            config,
            policy,
        }
    }

    /// Download one descriptor to object storage
    pub async fn process(&self, descriptor: FilingDescriptor, cancel: &CancellationToken) -> ItemResult {
        let key = descriptor.storage_key();

        if self.config.skip_existing {
            match self.objects.exists(&key).await {
                Ok(true) => {
                    debug!("{} already stored at {}", descriptor.filing_key(), key);
                    let local_path = self.local_path(&key);
                    return ItemResult::skipped(descriptor, local_path);
                }
                Ok(false) => {}
                Err(e) => warn!("Existence check failed for {}: {}", key, e),
            }
        }

        if !descriptor.is_supported() {
            let error = format!(
                "unsupported file extension: {:?}",
                descriptor.file_extension()
            );
            return ItemResult::failed(descriptor, ProcessingStatus::Failed, error, 0);
        }

        if self.config.mark_processing {
            self.mark_processing(&descriptor).await;
        }

        let (body, attempts) = match self.fetch_with_retries(descriptor.clone(), cancel).await {
            Fetched::Body { body, attempts } => (body, attempts),
            Fetched::Done(result) => return result,
        };

        let content_md5 = format!("{:x}", md5::compute(&body));
        let content_type = content_type_for(descriptor.file_extension());

        match self.objects.put(&key, body, content_type).await {
            Ok(stored) => {
                debug!(
                    "Stored {} ({} bytes) at {}",
                    descriptor.filing_key(),
                    stored.size,
                    stored.key
                );
                let local_path = stored
                    .local_path
                    .map(|path| path.display().to_string());
                ItemResult::succeeded(descriptor, stored.key, local_path, content_md5, attempts)
            }
            Err(e) => {
                warn!("Upload failed for {}: {}", key, e);
                ItemResult::failed(
                    descriptor,
                    ProcessingStatus::Failed,
                    format!("{} {}", STORAGE_ERROR_PREFIX, e),
                    attempts,
                )
            }
        }
    }

    async fn fetch_with_retries(
        &self,
        descriptor: FilingDescriptor,
        cancel: &CancellationToken,
    ) -> Fetched {
        let url = descriptor.source_url().to_string();
        let timeout = self.config.request_timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            // The deadline starts once the limiter grants a slot
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Fetched::Done(ItemResult::cancelled(descriptor, attempts));
                }
                _ = self.fetcher.wait_turn() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Fetched::Done(ItemResult::cancelled(descriptor, attempts));
                }
                outcome = tokio::time::timeout(timeout, self.fetcher.send(&url)) => outcome,
            };

            let (class, error) = match outcome {
                Ok(Ok(response)) => match classify_status(response.status) {
                    FetchClass::Success => {
                        return Fetched::Body {
                            body: response.body,
                            attempts,
                        }
                    }
                    class => (class, format!("HTTP {}", response.status)),
                },
                Ok(Err(e)) => (FetchClass::Transient, e.to_string()),
                Err(_) => (
                    FetchClass::Transient,
                    format!("request timed out after {:?}", timeout),
                ),
            };

            if !class.is_retriable() || !self.policy.should_retry(attempts) {
                debug!(
                    "{} gave up after {} attempt(s): {}",
                    descriptor.filing_key(),
                    attempts,
                    error
                );
                let status = class.exhausted_status();
                return Fetched::Done(ItemResult::failed(descriptor, status, error, attempts));
            }

            let delay = self.policy.next_delay();
            warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempts,
                self.policy.attempts(),
                url,
                error,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Fetched::Done(ItemResult::cancelled(descriptor, attempts));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Best-effort `PROCESSING` mark; never blocks the download
    async fn mark_processing(&self, descriptor: &FilingDescriptor) {
        let key = descriptor.filing_key();
        let current = match self.store.get_filing(&key).await {
            Ok(Some(filing)) => filing.processing_status,
            Ok(None) => return,
            Err(e) => {
                warn!("Could not read status of {}: {}", key, e);
                return;
            }
        };

        let next = match current.transition(Outcome::Started) {
            Ok(next) => next,
            Err(e) => {
                debug!("Not marking {} as processing: {}", key, e);
                return;
            }
        };

        if let Err(e) = self
            .store
            .update_status(&key, &StatusUpdate::status(next))
            .await
        {
            warn!("Could not mark {} as processing: {}", key, e);
        }
    }

    fn local_path(&self, key: &str) -> Option<String> {
        self.objects
            .local_path(key)
            .map(|path| path.display().to_string())
    }
}
