//! Command-line argument parsing for Filing Fetcher
//!
//! This module defines the CLI structure using clap derive macros: scraping
//! exchange announcements, downloading documents, inspecting processing
//! status and managing the configuration file.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::app::models::Market;
use crate::app::status::ProcessingStatus;

/// Filing Fetcher - Collect regulatory filings from exchange disclosure sites
#[derive(Parser, Debug)]
#[command(
    name = "filing_fetcher",
    version,
    about = "Scrape exchange announcements and download the filings they reference",
    long_about = "Searches the HKEX disclosure site for announcements in a date window, records
companies and filings in a tracking database, and downloads the documents into local or S3 storage
with a global rate limit, bounded concurrency and per-filing retry."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (trace level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - only errors are logged
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search announcements and record new filings
    Scrape(ScrapeArgs),

    /// Download filings from a manifest or retry stored failures
    Download(DownloadArgs),

    /// Show filing counts per processing status
    Status(StatusArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the scrape command
#[derive(Args, Debug, Clone, Default)]
pub struct ScrapeArgs {
    /// First day of the window (YYYY-MM-DD); defaults to yesterday
    #[arg(long, value_name = "DATE")]
    pub start_date: Option<NaiveDate>,

    /// Last day of the window (YYYY-MM-DD); defaults to the start date
    #[arg(long, value_name = "DATE")]
    pub end_date: Option<NaiveDate>,

    /// Market to search: SEHK (main board) or GEM
    #[arg(short, long)]
    pub market: Option<Market>,

    /// Write descriptors of new filings to this JSON-lines manifest
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Download new filings right after scraping
    #[arg(short, long)]
    pub download: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for the download command
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// JSON-lines manifest of descriptors to download
    #[arg(long, value_name = "FILE", conflicts_with = "retry")]
    pub manifest: Option<PathBuf>,

    /// Requeue and download stored filings in this status (PENDING, FAILED, RATE_LIMITED)
    #[arg(long, value_name = "STATUS")]
    pub retry: Option<ProcessingStatus>,

    /// Maximum number of filings to download
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Number of concurrent download workers
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Download even when the object already exists
    #[arg(short, long)]
    pub force: bool,

    /// Record PROCESSING before each fetch
    #[arg(long)]
    pub mark_processing: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// List filings in this status instead of counting
    #[arg(long, value_name = "STATUS")]
    pub list: Option<ProcessingStatus>,

    /// Maximum number of filings to list
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Destination (defaults to ./filing-fetcher.toml)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level directive from the verbosity flags, else `default`
    pub fn log_level(&self, default: &str) -> String {
        if self.global.quiet {
            "error".to_string()
        } else if self.global.very_verbose {
            "trace".to_string()
        } else if self.global.verbose {
            "debug".to_string()
        } else {
            default.to_string()
        }
    }

    /// Whether the command runs without a loaded configuration
    pub fn skips_config(&self) -> bool {
        matches!(
            self.command,
            Commands::Config(ConfigArgs {
                action: ConfigAction::Init { .. }
            })
        )
    }
}

impl DownloadArgs {
    /// Exactly one work source must be given
    pub fn validate(&self) -> Result<(), String> {
        match (&self.manifest, &self.retry) {
            (None, None) => Err("Specify either --manifest FILE or --retry STATUS".to_string()),
            (Some(_), Some(_)) => Err("--manifest and --retry cannot be combined".to_string()),
            _ => {
                if self.concurrency == Some(0) {
                    return Err("Number of workers must be greater than 0".to_string());
                }
                if self.limit == Some(0) {
                    return Err("--limit must be greater than 0".to_string());
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_scrape_arguments() {
        let cli = parse(&[
            "filing_fetcher",
            "scrape",
            "--start-date",
            "2024-01-01",
            "--end-date",
            "2024-03-15",
            "--market",
            "gem",
            "--json",
        ]);

        assert!(cli.global.json);
        match cli.command {
            Commands::Scrape(args) => {
                assert_eq!(args.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(args.end_date, NaiveDate::from_ymd_opt(2024, 3, 15));
                assert_eq!(args.market, Some(Market::Gem));
                assert!(!args.download);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bad_date_is_rejected() {
        assert!(Cli::try_parse_from(["filing_fetcher", "scrape", "--start-date", "15/03/2024"]).is_err());
    }

    #[test]
    fn test_download_arguments() {
        let cli = parse(&["filing_fetcher", "download", "--retry", "rate-limited", "-l", "10"]);
        match cli.command {
            Commands::Download(args) => {
                assert_eq!(args.retry, Some(ProcessingStatus::RateLimited));
                assert_eq!(args.limit, Some(10));
                assert!(args.validate().is_ok());
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from([
            "filing_fetcher",
            "download",
            "--manifest",
            "m.jsonl",
            "--retry",
            "FAILED"
        ])
        .is_err());
    }

    #[test]
    fn test_download_args_validation() {
        let mut args = DownloadArgs::default();
        assert!(args.validate().is_err());

        args.manifest = Some(PathBuf::from("m.jsonl"));
        assert!(args.validate().is_ok());

        args.concurrency = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let quiet = parse(&["filing_fetcher", "-q", "status"]);
        let verbose = parse(&["filing_fetcher", "status", "-v"]);
        let plain = parse(&["filing_fetcher", "status"]);

        assert_eq!(quiet.log_level("info"), "error");
        assert_eq!(verbose.log_level("info"), "debug");
        assert_eq!(plain.log_level("warn"), "warn");
    }

    #[test]
    fn test_config_init_skips_config_loading() {
        assert!(parse(&["filing_fetcher", "config", "init"]).skips_config());
        assert!(!parse(&["filing_fetcher", "config", "show"]).skips_config());
    }
}
