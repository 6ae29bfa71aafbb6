//! Application constants for Filing Fetcher
//!
//! This module centralizes the constants used throughout the application,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names for configuration overrides
pub mod env {
    /// Global request budget in requests per second
    pub const REQUESTS_PER_SECOND: &str = "REQUESTS_PER_SECOND";

    /// Number of concurrent download workers
    pub const CONCURRENCY: &str = "CONCURRENCY";

    /// Total attempts per item
    pub const RETRY_ATTEMPTS: &str = "RETRY_ATTEMPTS";

    /// Fixed delay between attempts in milliseconds
    pub const RETRY_DELAY_MS: &str = "RETRY_DELAY_MS";

    /// Lower jitter bound in milliseconds
    pub const MIN_REQUEST_DELAY_MS: &str = "MIN_REQUEST_DELAY_MS";

    /// Upper jitter bound in milliseconds
    pub const MAX_REQUEST_DELAY_MS: &str = "MAX_REQUEST_DELAY_MS";

    /// Per-request timeout in seconds
    pub const TIMEOUT_SECS: &str = "TIMEOUT_SECS";

    /// SQLite tracking database path
    pub const DATABASE_PATH: &str = "DATABASE_PATH";

    /// Root directory of the filesystem object store
    pub const STORAGE_ROOT: &str = "STORAGE_ROOT";

    /// S3 bucket; selects the S3 object store when set
    pub const S3_BUCKET: &str = "S3_BUCKET";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "Filing-Fetcher/0.1.0 (Regulatory Filings Ingestion)";

    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 10;
}

/// Rate limiting and retry configuration
pub mod limits {
    use super::Duration;

    /// Default global request budget (requests per second)
    pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 3.0;

    /// Default total attempts per item
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

    /// Fixed delay between attempts
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

    /// Lower bound of the random jitter added to each retry delay
    pub const DEFAULT_MIN_REQUEST_DELAY: Duration = Duration::from_millis(500);

    /// Upper bound of the random jitter added to each retry delay
    pub const DEFAULT_MAX_REQUEST_DELAY: Duration = Duration::from_secs(2);
}

/// HKEX title search endpoint
pub mod hkex {
    /// Base URL for documents linked from search results
    pub const BASE_URL: &str = "https://www1.hkexnews.hk";

    /// Title search servlet
    pub const SEARCH_URL: &str = "https://www1.hkexnews.hk/search/titleSearchServlet.do";

    /// Rows requested per page increment
    pub const DEFAULT_PAGE_SIZE: u64 = 100;

    /// Hard cap on pages fetched for one month chunk
    pub const MAX_PAGES_PER_CHUNK: u32 = 1000;

    /// Separator used when an announcement lists several stock codes
    pub const STOCK_CODE_SEPARATOR: &str = "<br/>";

    /// Announcement timestamps are Hong Kong local time
    pub const UTC_OFFSET_SECS: i32 = 8 * 3600;

    /// Numeric stock code bands reserved for structured products
    pub const STRUCTURED_PRODUCT_RANGES: &[(u32, u32)] =
        &[(10000, 29999), (50000, 69999), (80000, 89999)];
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Extensions the download engine will fetch
    pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "htm", "html"];

    /// Default local object store root
    pub const DEFAULT_STORAGE_ROOT: &str = "data/filings";

    /// Default tracking database path
    pub const DEFAULT_DATABASE_PATH: &str = "data/filings.db";

    /// Default configuration file name in the working directory
    pub const CONFIG_FILE_NAME: &str = "filing-fetcher.toml";
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of download workers
    pub const DEFAULT_CONCURRENCY: usize = 5;

    /// Maximum recommended concurrent workers
    pub const MAX_CONCURRENCY: usize = 64;

    /// Channel buffer size for progress events
    pub const CHANNEL_BUFFER_SIZE: usize = 100;
}

/// Logging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use files::{SUPPORTED_EXTENSIONS, TEMP_FILE_SUFFIX};
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::{DEFAULT_REQUESTS_PER_SECOND, DEFAULT_RETRY_ATTEMPTS};
pub use workers::DEFAULT_CONCURRENCY;
