//! Download engine configuration
//!
//! Retry timing is deliberately flat: every retry waits `retry_delay` plus a
//! uniformly random jitter drawn from `[min_request_delay, max_request_delay]`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{http, limits, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for the download engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of concurrent download workers
    pub concurrency: usize,
    /// Total attempts per item, including the first
    pub retry_attempts: u32,
    /// Fixed wait between attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Lower bound of the per-retry jitter
    #[serde(with = "humantime_serde")]
    pub min_request_delay: Duration,
    /// Upper bound of the per-retry jitter
    #[serde(with = "humantime_serde")]
    pub max_request_delay: Duration,
    /// Timeout applied to each fetch
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Report items whose object already exists as skipped without fetching
    pub skip_existing: bool,
    /// Write `PROCESSING` to the tracking store before each fetch
    pub mark_processing: bool,
    /// Buffer size of the progress channel
    pub progress_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: workers::DEFAULT_CONCURRENCY,
            retry_attempts: limits::DEFAULT_RETRY_ATTEMPTS,
            retry_delay: limits::DEFAULT_RETRY_DELAY,
            min_request_delay: limits::DEFAULT_MIN_REQUEST_DELAY,
            max_request_delay: limits::DEFAULT_MAX_REQUEST_DELAY,
            request_timeout: http::DEFAULT_TIMEOUT,
            skip_existing: true,
            mark_processing: false,
            progress_buffer_size: workers::CHANNEL_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    /// Collect every invalid setting
    pub fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.concurrency == 0 {
            errors.push("concurrency must be greater than zero".to_string());
        }
        if self.concurrency > workers::MAX_CONCURRENCY {
            errors.push(format!(
                "concurrency ({}) exceeds maximum ({})",
                self.concurrency,
                workers::MAX_CONCURRENCY
            ));
        }
        if self.retry_attempts == 0 {
            errors.push("retry_attempts must be at least 1".to_string());
        }
        if self.min_request_delay > self.max_request_delay {
            errors.push(format!(
                "min_request_delay ({:?}) must not exceed max_request_delay ({:?})",
                self.min_request_delay, self.max_request_delay
            ));
        }
        if self.request_timeout.is_zero() {
            errors.push("request_timeout must be greater than zero".to_string());
        }
        if self.progress_buffer_size == 0 {
            errors.push("progress_buffer_size must be greater than zero".to_string());
        }

        errors
    }

    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> ConfigResult<()> {
        let errors = self.problems();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed { errors })
        }
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the jitter range added to each retry delay
    pub fn jitter(mut self, min: Duration, max: Duration) -> Self {
        self.config.min_request_delay = min;
        self.config.max_request_delay = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn skip_existing(mut self, enabled: bool) -> Self {
        self.config.skip_existing = enabled;
        self
    }

    pub fn mark_processing(mut self, enabled: bool) -> Self {
        self.config.mark_processing = enabled;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> ConfigResult<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build without validation (for testing)
    pub fn build_unchecked(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert_eq!(config.min_request_delay, Duration::from_millis(500));
        assert_eq!(config.max_request_delay, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_validation() {
        assert!(EngineConfigBuilder::new().concurrency(0).build().is_err());
        assert!(EngineConfigBuilder::new().retry_attempts(0).build().is_err());
        assert!(EngineConfigBuilder::new()
            .jitter(Duration::from_secs(2), Duration::from_secs(1))
            .build()
            .is_err());

        let config = EngineConfigBuilder::new()
            .concurrency(12)
            .retry_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        assert_eq!(config.concurrency, 12);
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let config = EngineConfigBuilder::new()
            .concurrency(0)
            .retry_attempts(0)
            .build_unchecked();
        match config.validate() {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected validation result: {:?}", other),
        }
    }
}
