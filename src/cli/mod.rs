//! Command-line interface components
//!
//! Argument parsing, progress display and the command handlers that build
//! adapters from [`crate::config::AppConfig`] and drive the pipeline.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, DownloadArgs, GlobalArgs, ScrapeArgs, StatusArgs,
};
pub use commands::{handle_config, handle_download, handle_scrape, handle_status};
pub use progress::{ProgressConfig, ProgressDisplay, ProgressTally};
