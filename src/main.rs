//! Filing Fetcher CLI application
//!
//! Command-line interface for discovering HKEX announcements and downloading
//! the filing documents behind them into object storage.

use std::process;

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use filing_fetcher::cli::{
    handle_config, handle_download, handle_scrape, handle_status, Cli, Commands,
};
use filing_fetcher::config::AppConfig;
use filing_fetcher::constants::logging;
use filing_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Missing .env is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let config = if cli.skips_config() {
        AppConfig::default()
    } else {
        AppConfig::load(cli.global.config.clone()).await?
    };

    let default_level = if config.logging.level.is_empty() {
        logging::DEFAULT_LOG_LEVEL
    } else {
        config.logging.level.as_str()
    };
    init_logging(&cli, &cli.log_level(default_level));

    info!("Filing Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let global = cli.global;
    match cli.command {
        Commands::Scrape(args) => {
            info!("Executing scrape command");
            handle_scrape(args, &global, &config).await
        }
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(args, &global, &config).await
        }
        Commands::Status(args) => handle_status(args, &global, &config).await,
        Commands::Config(args) => handle_config(args, &config).await,
    }
}

/// Initialize logging from CLI verbosity and the configured default level
fn init_logging(cli: &Cli, level: &str) {
    let mut filter = EnvFilter::from_default_env();
    let mut rejected = None;
    match format!("filing_fetcher={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => rejected = Some(e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if let Some(e) = rejected {
        warn!("Ignoring invalid log level {:?}: {}", level, e);
    }
    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
