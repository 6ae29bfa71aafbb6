//! Error types for Filing Fetcher
//!
//! This module defines the error types for every component of the ingestion core.
//! Per-item download failures are not errors at this level: they are captured in
//! [`crate::app::engine::ItemResult`]. The types here cover setup, infrastructure
//! and data problems that a caller has to act on.

use std::path::PathBuf;
use thiserror::Error;

/// Outbound HTTP errors raised by the rate-limited client
///
/// Non-2xx responses are never errors here; the client hands the status
/// back to the caller for classification.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error (connect, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Connection-level failure reported by a non-reqwest fetcher
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Invalid URL provided
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Rate limiter could not be built from the configured value
    #[error("Invalid rate limit: {reason}")]
    InvalidRateLimit { reason: String },

    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}

/// Errors from the exchange search/list endpoint
#[derive(Error, Debug)]
pub enum SearchError {
    /// Transport failure while fetching a page
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Search endpoint returned a non-success status
    #[error("Search endpoint returned HTTP {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Response body could not be decoded
    #[error("Invalid search response: {reason}")]
    InvalidResponse { reason: String },

    /// Search URL could not be built
    #[error("Invalid search URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Tracking store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Store cannot be reached or opened
    #[error("Tracking store unavailable: {reason}")]
    Unavailable { reason: String },

    /// Stored record could not be decoded
    #[error("Invalid stored record: {reason}")]
    InvalidRecord { reason: String },

    /// Blocking task running a store operation failed
    #[error("Store task failed: {0}")]
    TaskJoin(String),

    /// Filesystem error preparing the store location
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Local filesystem error
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend cannot be reached
    #[error("Object storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// Upload failed
    #[error("Failed to upload {key}: {reason}")]
    Upload { key: String, reason: String },

    /// Existence check failed
    #[error("Failed to check {key}: {reason}")]
    Head { key: String, reason: String },

    /// Key is not a safe relative object key
    #[error("Invalid object key: {key}")]
    InvalidKey { key: String },

    /// Atomic rename of a temporary file failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },
}

/// Descriptor manifest errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file not found
    #[error("Manifest file not found: {path}")]
    NotFound { path: PathBuf },

    /// I/O error reading or writing a manifest
    #[error("I/O error on manifest: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error while writing a manifest
    #[error("JSON error in manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<String> },

    /// I/O error reading or writing configuration
    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected processing status transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The outcome cannot be applied to the current status
    #[error("Invalid status transition from {from} on outcome {outcome}")]
    Invalid { from: String, outcome: String },
}

/// Per-record failures while resolving announcements
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Announcement lacks a field needed to identify or fetch it
    #[error("Announcement is missing required field {field}")]
    MissingField { field: &'static str },

    /// Store lookup or upsert failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Outbound HTTP error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Search endpoint error
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Tracking store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Object storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Manifest error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Status transition error
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Fetch(FetchError::Timeout { .. })
            | AppError::Fetch(FetchError::Http(_))
            | AppError::Fetch(FetchError::Connection(_))
            | AppError::Search(SearchError::Fetch(_))
            | AppError::Search(SearchError::UnexpectedStatus { .. })
            | AppError::Store(StoreError::Unavailable { .. })
            | AppError::Storage(StorageError::Unavailable { .. }) => true,

            AppError::Config(_)
            | AppError::Manifest(ManifestError::NotFound { .. })
            | AppError::Transition(_) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Fetch(_) => "fetch",
            AppError::Search(_) => "search",
            AppError::Store(_) => "store",
            AppError::Storage(_) => "storage",
            AppError::Manifest(_) => "manifest",
            AppError::Config(_) => "config",
            AppError::Transition(_) => "transition",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Fetch result type alias
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Search result type alias
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Store result type alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage result type alias
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Manifest result type alias
pub type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
