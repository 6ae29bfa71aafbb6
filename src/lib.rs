//! Filing Fetcher Library
//!
//! Discovers regulatory filing announcements on HKEXnews, tracks every
//! filing through a processing status lifecycle, and downloads the
//! documents into filesystem or S3 storage with rate limiting and retries.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

pub use errors::{AppError, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use constants::*;

    #[test]
    fn test_constants_accessible() {
        assert_eq!(workers::DEFAULT_CONCURRENCY, 5);
        assert_eq!(env::S3_BUCKET, "S3_BUCKET");
        assert!(http::USER_AGENT.contains("Filing-Fetcher"));
    }

    #[test]
    fn test_error_types() {
        let app_error = AppError::from(errors::TransitionError::Invalid {
            from: "COMPLETED".to_string(),
            outcome: "Requeued".to_string(),
        });

        assert_eq!(app_error.category(), "transition");
        assert!(!app_error.is_recoverable());
    }
}
