//! Response classification and retry timing

use std::time::Duration;

use rand::Rng;

use super::config::EngineConfig;
use crate::app::status::ProcessingStatus;

/// How a fetch attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchClass {
    /// 2xx: store the body
    Success,
    /// 404/410: the document is gone, never retry
    NotFound,
    /// 403/429: the source is pushing back, retry
    Throttled,
    /// Anything else, including transport errors and timeouts: retry
    Transient,
}

impl FetchClass {
    /// Final status when attempts run out in this class
    pub fn exhausted_status(&self) -> ProcessingStatus {
        match self {
            Self::Success => ProcessingStatus::Completed,
            Self::NotFound => ProcessingStatus::UrlFailure,
            Self::Throttled => ProcessingStatus::RateLimited,
            Self::Transient => ProcessingStatus::Failed,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Throttled | Self::Transient)
    }
}

/// Classify an HTTP status code
pub fn classify_status(status: u16) -> FetchClass {
    match status {
        200..=299 => FetchClass::Success,
        404 | 410 => FetchClass::NotFound,
        403 | 429 => FetchClass::Throttled,
        _ => FetchClass::Transient,
    }
}

/// Fixed-delay retry policy with additive jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    min_jitter: Duration,
    max_jitter: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, min_jitter: Duration, max_jitter: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
            min_jitter,
            max_jitter,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.retry_attempts,
            config.retry_delay,
            config.min_request_delay,
            config.max_request_delay,
        )
    }

    /// Total attempts per item
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt follows attempt number `attempt` (1-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts
    }

    /// Wait before the next attempt: the fixed delay plus one jitter draw
    pub fn next_delay(&self) -> Duration {
        self.delay + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if self.min_jitter >= self.max_jitter {
            return self.min_jitter;
        }
        rand::thread_rng().gen_range(self.min_jitter..=self.max_jitter)
    }
}
