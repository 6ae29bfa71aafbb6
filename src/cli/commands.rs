//! Command handlers for Filing Fetcher CLI
//!
//! This module implements the command handlers that turn CLI arguments and
//! the loaded [`AppConfig`] into concrete adapters and pipeline calls.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::{
    read_manifest, shutdown_token, write_manifest, DownloadSummary, FilesystemStore, FilingStore,
    ObjectStore, Outcome, Pipeline, ProcessingStatus, RateLimitedClient, S3Store, ScrapeRequest,
    SqliteFilingStore, StatusUpdate,
};
use crate::cli::{
    ConfigAction, ConfigArgs, DownloadArgs, GlobalArgs, ProgressConfig, ProgressDisplay,
    ScrapeArgs, StatusArgs,
};
use crate::config::{AppConfig, StorageBackend};
use crate::constants::files;
use crate::errors::{AppError, Result, StorageError};

/// Adapters built from configuration, shared by scrape and download
struct Runtime {
    store: Arc<SqliteFilingStore>,
    pipeline: Pipeline,
    progress_buffer: usize,
}

impl Runtime {
    async fn build(config: &AppConfig) -> Result<Self> {
        let fetcher = Arc::new(RateLimitedClient::new(&config.client)?);
        let store = Arc::new(SqliteFilingStore::open(&config.store.database_path)?);
        let objects = open_object_store(config).await?;
        info!("Tracking database: {}", config.store.database_path.display());

        let pipeline = Pipeline::new(
            fetcher,
            store.clone(),
            objects,
            config.search.clone(),
            config.engine.clone(),
        );
        Ok(Self {
            store,
            pipeline,
            progress_buffer: config.engine.progress_buffer_size,
        })
    }
}

async fn open_object_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Filesystem => Ok(Arc::new(FilesystemStore::new(storage.root.clone()))),
        StorageBackend::S3 => {
            let bucket = storage
                .bucket
                .clone()
                .ok_or_else(|| StorageError::Unavailable {
                    reason: "no S3 bucket configured".to_string(),
                })?;
            let mut store = S3Store::from_env(bucket, storage.endpoint_url.as_deref()).await;
            if let Some(prefix) = &storage.prefix {
                store = store.with_prefix(prefix.clone());
            }
            Ok(Arc::new(store))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::generic(format!("Failed to encode output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

/// Run a download with an optional progress bar attached
async fn run_download(
    runtime: Runtime,
    descriptors: Vec<crate::app::FilingDescriptor>,
    global: &GlobalArgs,
    no_progress: bool,
) -> Result<DownloadSummary> {
    let total = descriptors.len();
    let (tx, rx) = mpsc::channel(runtime.progress_buffer);
    let display = ProgressDisplay::new(
        total,
        ProgressConfig {
            hidden: no_progress || global.quiet || global.json,
            show_failures: global.verbose || global.very_verbose,
        },
    )
    .spawn(rx);

    let pipeline = runtime.pipeline.with_progress(tx);
    let result = pipeline.download(descriptors, shutdown_token()).await;
    // Drops the last progress sender so the display can finish
    drop(pipeline);
    if let Err(e) = display.await {
        warn!("Progress display task failed: {}", e);
    }
    result
}

fn print_download_summary(summary: &DownloadSummary) {
    println!("\n📊 Download Summary:");
    println!("  Total filings: {}", summary.total_filings);
    println!(
        "  Successful: {} ({} already stored)",
        summary.successful, summary.skipped
    );
    println!("  Failed: {}", summary.failed);
    println!("    Transient: {}", summary.transient_failures);
    println!("    URL failures: {}", summary.url_failures);
    println!("    Rate limited: {}", summary.rate_limited);
    if summary.write_errors > 0 {
        println!("  Status write errors: {}", summary.write_errors);
    }
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());

    if !summary.failures.is_empty() {
        println!("\nFailures:");
        for item in summary.failures.iter().take(10) {
            println!(
                "  • {} [{}] {}",
                item.filing_key,
                item.status,
                item.error.as_deref().unwrap_or("")
            );
        }
        if summary.failures.len() > 10 {
            println!("  ... and {} more", summary.failures.len() - 10);
        }
    }
}

/// Handle the scrape command
pub async fn handle_scrape(args: ScrapeArgs, global: &GlobalArgs, config: &AppConfig) -> Result<()> {
    let runtime = Runtime::build(config).await?;
    let request = ScrapeRequest {
        start_date: args.start_date,
        end_date: args.end_date,
        market: args.market,
    };

    let result = runtime.pipeline.scrape(request).await?;

    if let Some(path) = &args.manifest {
        write_manifest(path, &result.filings).await?;
        info!(
            "Wrote {} descriptors to {}",
            result.filings.len(),
            path.display()
        );
    }

    if !global.json {
        println!(
            "🔎 {} announcements {} to {} ({})",
            result.total_announcements, result.start_date, result.end_date, result.market
        );
        println!("  New filings: {}", result.new_filings);
        println!("  Updated filings: {}", result.updated_filings);
        println!("  Skipped rows: {}", result.skipped);
        println!("  Unsupported documents: {}", result.unsupported);
        println!("  Errors: {}", result.errors);
    }

    if !args.download {
        if global.json {
            print_json(&result)?;
        }
        return Ok(());
    }

    let descriptors = result.filings.clone();
    let summary = run_download(runtime, descriptors, global, args.no_progress).await?;

    if global.json {
        #[derive(Serialize)]
        struct ScrapeAndDownload<'a> {
            scrape: &'a crate::app::ScrapeResult,
            download: &'a DownloadSummary,
        }
        print_json(&ScrapeAndDownload {
            scrape: &result,
            download: &summary,
        })
    } else {
        print_download_summary(&summary);
        Ok(())
    }
}

/// Handle the download command
pub async fn handle_download(args: DownloadArgs, global: &GlobalArgs, config: &AppConfig) -> Result<()> {
    args.validate().map_err(AppError::generic)?;

    let mut config = config.clone();
    if let Some(concurrency) = args.concurrency {
        config.engine.concurrency = concurrency;
    }
    if args.force {
        config.engine.skip_existing = false;
    }
    if args.mark_processing {
        config.engine.mark_processing = true;
    }
    config.validate()?;

    let runtime = Runtime::build(&config).await?;
    let limit = args.limit.unwrap_or(usize::MAX);

    let descriptors = match (&args.manifest, args.retry) {
        (Some(path), _) => {
            let load = read_manifest(path).await?;
            if load.malformed > 0 {
                warn!("{} malformed manifest lines were skipped", load.malformed);
            }
            load.descriptors.into_iter().take(limit).collect()
        }
        (None, Some(status)) => requeue(runtime.store.as_ref(), status, limit).await?,
        (None, None) => Vec::new(),
    };

    if descriptors.is_empty() {
        if global.json {
            print_json(&serde_json::json!({ "total_filings": 0 }))?;
        } else {
            println!("ℹ️  No filings to download");
        }
        return Ok(());
    }

    if !global.json && !global.quiet {
        println!(
            "🚀 Downloading {} filings with {} workers...",
            descriptors.len(),
            config.engine.concurrency
        );
    }

    let summary = run_download(runtime, descriptors, global, args.no_progress).await?;
    if global.json {
        print_json(&summary)
    } else {
        print_download_summary(&summary);
        Ok(())
    }
}

/// Move stored filings in `status` back to `PENDING` and return their descriptors
async fn requeue(
    store: &dyn FilingStore,
    status: ProcessingStatus,
    limit: usize,
) -> Result<Vec<crate::app::FilingDescriptor>> {
    // Fail fast on statuses the state machine never requeues
    let next = status.transition(Outcome::Requeued)?;

    let filings = store.filings_with_status(status, limit).await?;
    let mut descriptors = Vec::with_capacity(filings.len());
    for filing in filings {
        let key = filing.key();
        if store
            .update_status(&key, &StatusUpdate::status(next))
            .await?
        {
            descriptors.push(filing.descriptor());
        }
    }

    info!("Requeued {} {} filings", descriptors.len(), status);
    Ok(descriptors)
}

/// Handle the status command
pub async fn handle_status(args: StatusArgs, global: &GlobalArgs, config: &AppConfig) -> Result<()> {
    let store = SqliteFilingStore::open(&config.store.database_path)?;

    if let Some(status) = args.list {
        let filings = store.filings_with_status(status, args.limit).await?;
        if global.json {
            return print_json(&filings);
        }
        println!("{} filings ({} shown):", status, filings.len());
        for filing in &filings {
            println!(
                "  {}  {}  {}  {}",
                filing.key(),
                filing.report_date.format("%Y-%m-%d"),
                filing.company_id,
                filing.processing_error.as_deref().unwrap_or(&filing.title)
            );
        }
        return Ok(());
    }

    let counts = store.count_by_status().await?;
    if global.json {
        return print_json(&counts);
    }

    let total: u64 = counts.values().sum();
    println!("📋 Filing Status ({})", config.store.database_path.display());
    for (status, count) in &counts {
        println!("  {:<14}{:>8}", status.as_str(), count);
    }
    println!("  {:<14}{:>8}", "TOTAL", total);
    Ok(())
}

/// Handle config subcommands
pub async fn handle_config(args: ConfigArgs, config: &AppConfig) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from(files::CONFIG_FILE_NAME));
            AppConfig::write_default(&path, force).await?;
            println!("📁 Created default configuration file:");
            println!("   {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
