//! Persist download outcomes and summarize a batch
//!
//! Every status change goes through [`ProcessingStatus::transition`]. A
//! stored status that is retriable (`FAILED`, `RATE_LIMITED`) is requeued
//! first, so a re-run after a failure moves the filing forward instead of
//! being rejected. Individual write failures are counted, never propagated.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::engine::{BatchResult, ItemResult};
use crate::app::models::Filing;
use crate::app::status::{Outcome, ProcessingStatus};
use crate::app::store::{FilingStore, StatusUpdate};
use crate::errors::{Result, StoreError};

/// Counts for one applied batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub total: usize,
    pub success: usize,
    /// Every item that did not complete, matching `BatchResult::failed`
    pub failed: usize,
    /// `FAILED` items, cancelled ones included
    pub transient_failures: usize,
    pub url_failures: usize,
    pub rate_limited: usize,
    /// Items whose status could not be persisted
    pub write_errors: usize,
    /// Items whose outcome was not a legal move from the stored status
    pub rejected: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} filings: {} completed, {} failed ({} transient, {} URL failures, {} rate limited), {} write errors in {:.1}s",
            self.total,
            self.success,
            self.failed,
            self.transient_failures,
            self.url_failures,
            self.rate_limited,
            self.write_errors,
            self.duration.as_secs_f64()
        )
    }
}

/// What happened to one item's status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Written,
    Unchanged,
    Rejected,
}

/// Writes engine results back to the tracking store
pub struct ResultAggregator {
    store: Arc<dyn FilingStore>,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn FilingStore>) -> Self {
        Self { store }
    }

    /// Persist every item of `batch` and count the outcomes
    ///
    /// Fails only if the store is unreachable before the first write.
    pub async fn apply(&self, batch: &BatchResult) -> Result<AggregateSummary> {
        self.store.ping().await?;

        let mut summary = AggregateSummary {
            total: batch.items.len(),
            duration: batch.duration,
            ..AggregateSummary::default()
        };

        for item in &batch.items {
            match item.status {
                ProcessingStatus::Completed => summary.success += 1,
                ProcessingStatus::UrlFailure => summary.url_failures += 1,
                ProcessingStatus::RateLimited => summary.rate_limited += 1,
                _ => summary.transient_failures += 1,
            }
            if item.status != ProcessingStatus::Completed {
                summary.failed += 1;
            }

            match self.apply_item(item).await {
                Ok(Applied::Written) => {}
                Ok(Applied::Unchanged) => {
                    debug!("{} already up to date", item.filing_key);
                }
                Ok(Applied::Rejected) => summary.rejected += 1,
                Err(e) => {
                    warn!("Failed to record status for {}: {}", item.filing_key, e);
                    summary.write_errors += 1;
                }
            }
        }

        info!("{}", summary);
        Ok(summary)
    }

    async fn apply_item(&self, item: &ItemResult) -> std::result::Result<Applied, StoreError> {
        let Some(outcome) = Outcome::for_status(item.status) else {
            warn!(
                "{} reported non-terminal status {}; ignoring",
                item.filing_key, item.status
            );
            return Ok(Applied::Rejected);
        };

        let current = match self.store.get_filing(&item.filing_key).await? {
            Some(filing) => filing.processing_status,
            None => {
                self.store
                    .upsert_filing(&Filing::from_descriptor(&item.descriptor))
                    .await?;
                ProcessingStatus::Pending
            }
        };

        if item.skipped && current == ProcessingStatus::Completed {
            return Ok(Applied::Unchanged);
        }

        let next = match next_status(current, outcome) {
            Ok(next) => next,
            Err(e) => {
                warn!("Not recording {}: {}", item.filing_key, e);
                return Ok(Applied::Rejected);
            }
        };

        let update = status_update(item, next);
        if !self.store.update_status(&item.filing_key, &update).await? {
            return Err(StoreError::InvalidRecord {
                reason: format!("filing {} disappeared during update", item.filing_key),
            });
        }
        Ok(Applied::Written)
    }
}

/// Requeue retriable states before applying a fresh outcome
fn next_status(
    current: ProcessingStatus,
    outcome: Outcome,
) -> std::result::Result<ProcessingStatus, crate::errors::TransitionError> {
    let from = if current.is_retriable() && outcome != Outcome::Requeued {
        current.transition(Outcome::Requeued)?
    } else {
        current
    };
    from.transition(outcome)
}

fn status_update(item: &ItemResult, status: ProcessingStatus) -> StatusUpdate {
    let mut update = StatusUpdate::status(status).with_error(item.error.clone());
    if item.success {
        update.storage_key = item.storage_key.clone();
        update.local_path = item.local_path.clone();
        update.content_md5 = item.content_md5.clone();
        if !item.skipped {
            update.ingested_at = Some(Utc::now());
        }
    }
    update
}
