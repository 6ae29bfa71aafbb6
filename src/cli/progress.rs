//! Download progress display
//!
//! Consumes [`DownloadProgress`] events from the engine and drives an
//! indicatif bar on stderr. The bar hides itself when stderr is not a
//! terminal; failures are printed above it as they happen in verbose mode.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::engine::DownloadProgress;
use crate::app::status::ProcessingStatus;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Options for the progress display
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressConfig {
    /// Draw nothing at all
    pub hidden: bool,
    /// Print each failed item above the bar
    pub show_failures: bool,
}

/// Running tallies shown in the bar message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTally {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ProgressTally {
    fn record(&mut self, event: &DownloadProgress) {
        match event.item.status {
            ProcessingStatus::Completed if event.item.skipped => self.skipped += 1,
            ProcessingStatus::Completed => self.completed += 1,
            _ => self.failed += 1,
        }
    }

    fn message(&self) -> String {
        format!(
            "{} stored, {} skipped, {} failed",
            self.completed, self.skipped, self.failed
        )
    }
}

/// Progress bar fed from an engine progress channel
pub struct ProgressDisplay {
    bar: ProgressBar,
    config: ProgressConfig,
}

impl ProgressDisplay {
    pub fn new(total: usize, config: ProgressConfig) -> Self {
        let bar = if config.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr())
        };

        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("##-"));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("starting");

        Self { bar, config }
    }

    /// Consume events until every sender is dropped
    ///
    /// Returns the final tallies.
    pub fn spawn(self, mut rx: mpsc::Receiver<DownloadProgress>) -> JoinHandle<ProgressTally> {
        tokio::spawn(async move {
            let mut tally = ProgressTally::default();
            while let Some(event) = rx.recv().await {
                tally.record(&event);
                self.bar.set_position(event.completed as u64);
                self.bar.set_message(tally.message());

                if self.config.show_failures && !event.item.success {
                    self.bar.println(format!(
                        "{} {}: {}",
                        event.item.status,
                        event.item.filing_key,
                        event.item.error.as_deref().unwrap_or("unknown error")
                    ));
                }
            }
            self.bar.finish_with_message(tally.message());
            tally
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::engine::ItemResult;
    use crate::app::models::{Exchange, FilingDescriptor};
    use chrono::Utc;

    fn event(completed: usize, item: ItemResult) -> DownloadProgress {
        DownloadProgress {
            completed,
            total: 3,
            item,
        }
    }

    fn descriptor(id: &str) -> FilingDescriptor {
        FilingDescriptor::new(Exchange::Hkex, id, "https://x/a.pdf", "1", "pdf", Utc::now())
    }

    #[tokio::test]
    async fn test_hidden_display_tallies_events() {
        let (tx, rx) = mpsc::channel(8);
        let handle = ProgressDisplay::new(
            3,
            ProgressConfig {
                hidden: true,
                show_failures: true,
            },
        )
        .spawn(rx);

        tx.send(event(1, ItemResult::skipped(descriptor("1"), None)))
            .await
            .unwrap();
        tx.send(event(
            2,
            ItemResult::succeeded(descriptor("2"), "k".into(), None, "m".into(), 1),
        ))
        .await
        .unwrap();
        tx.send(event(
            3,
            ItemResult::failed(descriptor("3"), ProcessingStatus::UrlFailure, "HTTP 404", 1),
        ))
        .await
        .unwrap();
        drop(tx);

        let tally = handle.await.unwrap();
        assert_eq!(
            tally,
            ProgressTally {
                completed: 1,
                skipped: 1,
                failed: 1
            }
        );
    }
}
