//! Configuration management for Filing Fetcher
//!
//! Settings are layered: built-in defaults, then a TOML file (explicit
//! `--config` path or the first standard location found), then environment
//! variables, then CLI flags applied by the command handlers.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{ClientConfig, EngineConfig, SearchConfig};
use crate::constants::{env, files, limits, logging, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Rate-limited HTTP client
    pub client: ClientConfig,
    /// Title search endpoint
    pub search: SearchConfig,
    /// Download engine
    pub engine: EngineConfig,
    /// Tracking database
    pub store: StoreConfig,
    /// Object storage for downloaded documents
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Tracking database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(files::DEFAULT_DATABASE_PATH),
        }
    }
}

/// Where downloaded documents are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    S3,
}

/// Object storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the filesystem backend
    pub root: PathBuf,
    /// Bucket for the S3 backend
    pub bucket: Option<String>,
    /// Key prefix inside the bucket
    pub prefix: Option<String>,
    /// Custom endpoint for S3-compatible services
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Filesystem,
            root: PathBuf::from(files::DEFAULT_STORAGE_ROOT),
            bucket: None,
            prefix: None,
            endpoint_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when neither `RUST_LOG` nor a verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let path = match config_file_override {
            Some(path) if path.exists() => Some(path),
            Some(path) => return Err(ConfigError::NotFound { path }),
            None => Self::find_config_file(),
        };

        let mut config = match path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(files::CONFIG_FILE_NAME)];
        if let Some(path) = Self::default_config_path() {
            search_paths.push(path);
        }

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Per-user config file location
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("filing-fetcher").join("config.toml"))
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get(env::REQUESTS_PER_SECOND) {
            self.client.requests_per_second = parse_value(env::REQUESTS_PER_SECOND, &value)?;
        }
        if let Some(value) = get(env::CONCURRENCY) {
            self.engine.concurrency = parse_value(env::CONCURRENCY, &value)?;
        }
        if let Some(value) = get(env::RETRY_ATTEMPTS) {
            self.engine.retry_attempts = parse_value(env::RETRY_ATTEMPTS, &value)?;
        }
        if let Some(value) = get(env::RETRY_DELAY_MS) {
            self.engine.retry_delay = parse_millis(env::RETRY_DELAY_MS, &value)?;
        }
        if let Some(value) = get(env::MIN_REQUEST_DELAY_MS) {
            self.engine.min_request_delay = parse_millis(env::MIN_REQUEST_DELAY_MS, &value)?;
        }
        if let Some(value) = get(env::MAX_REQUEST_DELAY_MS) {
            self.engine.max_request_delay = parse_millis(env::MAX_REQUEST_DELAY_MS, &value)?;
        }
        if let Some(value) = get(env::TIMEOUT_SECS) {
            let timeout = Duration::from_secs(parse_value(env::TIMEOUT_SECS, &value)?);
            self.client.request_timeout = timeout;
            self.engine.request_timeout = timeout;
        }
        if let Some(value) = get(env::DATABASE_PATH) {
            self.store.database_path = PathBuf::from(value);
        }
        if let Some(value) = get(env::STORAGE_ROOT) {
            self.storage.root = PathBuf::from(value);
        }
        if let Some(value) = get(env::S3_BUCKET) {
            self.storage.backend = StorageBackend::S3;
            self.storage.bucket = Some(value);
        }

        Ok(())
    }

    /// Validate every section, reporting all problems at once
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if let Err(client) = self.client.validate() {
            errors.extend(client);
        }
        if let Err(search) = self.search.validate() {
            errors.extend(search);
        }
        errors.extend(self.engine.problems());

        if self.storage.backend == StorageBackend::S3
            && self.storage.bucket.as_deref().map_or(true, str::is_empty)
        {
            errors.push("storage.bucket is required for the s3 backend".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }

    /// Current configuration as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write a commented default configuration file
    ///
    /// Refuses to replace an existing file unless `force` is set.
    pub async fn write_default(path: &Path, force: bool) -> ConfigResult<()> {
        if path.exists() && !force {
            return Err(ConfigError::InvalidValue {
                field: "path".to_string(),
                value: path.display().to_string(),
                reason: "file already exists (use --force to overwrite)".to_string(),
            });
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, Self::generate_default_config_content()).await?;
        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// Default configuration content with comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# Filing Fetcher Configuration
# Environment variables (REQUESTS_PER_SECOND, CONCURRENCY, RETRY_ATTEMPTS,
# RETRY_DELAY_MS, MIN_REQUEST_DELAY_MS, MAX_REQUEST_DELAY_MS, TIMEOUT_SECS,
# DATABASE_PATH, STORAGE_ROOT, S3_BUCKET) override these values.

[client]
# Global request budget shared by search and downloads
requests_per_second = {rps:.1}
request_timeout = "30s"
connect_timeout = "10s"
pool_idle_timeout = "90s"
pool_max_per_host = 10
tcp_nodelay = true

[search]
page_size = 100
max_pages_per_chunk = 1000
language = "E"

[engine]
concurrency = {concurrency}
# Total attempts per filing, including the first
retry_attempts = {attempts}
retry_delay = "2s"
# Each retry waits retry_delay plus a random delay in this range
min_request_delay = "500ms"
max_request_delay = "2s"
request_timeout = "30s"
skip_existing = true
mark_processing = false

[store]
database_path = "{database}"

[storage]
# "filesystem" or "s3"
backend = "filesystem"
root = "{root}"
# bucket = "my-filings"
# prefix = "raw"
# endpoint_url = "http://localhost:9000"

[logging]
level = "info"  # error, warn, info, debug, trace
"#,
            rps = limits::DEFAULT_REQUESTS_PER_SECOND,
            concurrency = workers::DEFAULT_CONCURRENCY,
            attempts = limits::DEFAULT_RETRY_ATTEMPTS,
            database = files::DEFAULT_DATABASE_PATH,
            root = files::DEFAULT_STORAGE_ROOT,
        )
    }
}

fn parse_value<T: FromStr>(field: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn parse_millis(field: &str, value: &str) -> ConfigResult<Duration> {
    parse_value(field, value).map(Duration::from_millis)
}
