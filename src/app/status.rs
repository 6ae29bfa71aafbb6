//! Filing processing state machine
//!
//! [`ProcessingStatus::transition`] is the only place next states are derived.
//! Everything that writes a status (aggregator, CLI retry driver) applies an
//! [`Outcome`] through it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::models::ParseEnumError;
use crate::errors::TransitionError;

/// Processing status of a persisted filing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Source reported the document as gone; never retried
    UrlFailure,
    RateLimited,
}

/// Event applied to a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// A worker picked the filing up
    Started,
    /// Document fetched and stored
    Succeeded,
    /// Source returned 404/410
    NotFound,
    /// Source kept throttling until attempts ran out
    Throttled,
    /// Transient or storage failure after all attempts
    Failed,
    /// External retry driver puts the filing back in the queue
    Requeued,
}

impl ProcessingStatus {
    pub const ALL: [ProcessingStatus; 6] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::UrlFailure,
        Self::RateLimited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::UrlFailure => "URL_FAILURE",
            Self::RateLimited => "RATE_LIMITED",
        }
    }

    /// Apply an outcome, returning the next status
    ///
    /// `Processing` is optional: terminal outcomes are accepted straight from
    /// `Pending`. Re-applying the outcome that produced a terminal state is a
    /// no-op. `Requeued` is the only way back to `Pending`.
    pub fn transition(self, outcome: Outcome) -> Result<ProcessingStatus, TransitionError> {
        use Outcome as O;
        use ProcessingStatus as S;

        let next = match (self, outcome) {
            (S::Pending | S::Processing, O::Started) => S::Processing,

            (S::Pending | S::Processing | S::Completed, O::Succeeded) => S::Completed,
            (S::Pending | S::Processing | S::UrlFailure, O::NotFound) => S::UrlFailure,
            (S::Pending | S::Processing | S::RateLimited, O::Throttled) => S::RateLimited,
            (S::Pending | S::Processing | S::Failed, O::Failed) => S::Failed,

            (S::Pending | S::Failed | S::RateLimited, O::Requeued) => S::Pending,

            (from, outcome) => {
                return Err(TransitionError::Invalid {
                    from: from.to_string(),
                    outcome: format!("{:?}", outcome),
                })
            }
        };
        Ok(next)
    }

    /// No further automatic transitions happen from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::UrlFailure | Self::RateLimited
        )
    }

    /// An external retry driver may requeue filings in this status
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Failed | Self::RateLimited)
    }
}

impl Outcome {
    /// Outcome that produces a terminal per-item status
    pub fn for_status(status: ProcessingStatus) -> Option<Outcome> {
        match status {
            ProcessingStatus::Completed => Some(Outcome::Succeeded),
            ProcessingStatus::UrlFailure => Some(Outcome::NotFound),
            ProcessingStatus::RateLimited => Some(Outcome::Throttled),
            ProcessingStatus::Failed => Some(Outcome::Failed),
            ProcessingStatus::Processing => Some(Outcome::Started),
            ProcessingStatus::Pending => None,
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                kind: "processing status",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let status = ProcessingStatus::Pending
            .transition(Outcome::Started)
            .and_then(|s| s.transition(Outcome::Succeeded))
            .unwrap();
        assert_eq!(status, ProcessingStatus::Completed);
    }

    #[test]
    fn test_processing_is_optional() {
        assert_eq!(
            ProcessingStatus::Pending.transition(Outcome::NotFound),
            Ok(ProcessingStatus::UrlFailure)
        );
        assert_eq!(
            ProcessingStatus::Pending.transition(Outcome::Throttled),
            Ok(ProcessingStatus::RateLimited)
        );
    }

    #[test]
    fn test_terminal_outcomes_are_idempotent() {
        for status in [
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
            ProcessingStatus::UrlFailure,
            ProcessingStatus::RateLimited,
        ] {
            let outcome = Outcome::for_status(status).unwrap();
            assert_eq!(status.transition(outcome), Ok(status));
        }
    }

    #[test]
    fn test_requeue_only_from_retriable() {
        assert_eq!(
            ProcessingStatus::Failed.transition(Outcome::Requeued),
            Ok(ProcessingStatus::Pending)
        );
        assert_eq!(
            ProcessingStatus::RateLimited.transition(Outcome::Requeued),
            Ok(ProcessingStatus::Pending)
        );
        assert_eq!(
            ProcessingStatus::Pending.transition(Outcome::Requeued),
            Ok(ProcessingStatus::Pending)
        );
        assert!(ProcessingStatus::UrlFailure
            .transition(Outcome::Requeued)
            .is_err());
        assert!(ProcessingStatus::Completed
            .transition(Outcome::Requeued)
            .is_err());
    }

    #[test]
    fn test_completed_cannot_regress() {
        assert!(ProcessingStatus::Completed
            .transition(Outcome::Failed)
            .is_err());
        assert!(ProcessingStatus::Completed
            .transition(Outcome::Started)
            .is_err());
        assert!(ProcessingStatus::UrlFailure
            .transition(Outcome::Succeeded)
            .is_err());
    }

    #[test]
    fn test_helpers() {
        assert!(ProcessingStatus::UrlFailure.is_terminal());
        assert!(!ProcessingStatus::UrlFailure.is_retriable());
        assert!(ProcessingStatus::RateLimited.is_retriable());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }

    #[test]
    fn test_string_round_trip() {
        for status in ProcessingStatus::ALL {
            assert_eq!(status.as_str().parse::<ProcessingStatus>(), Ok(status));
        }
        assert_eq!(
            "url-failure".parse::<ProcessingStatus>(),
            Ok(ProcessingStatus::UrlFailure)
        );
        assert_eq!(
            serde_json::to_string(&ProcessingStatus::RateLimited).unwrap(),
            "\"RATE_LIMITED\""
        );
    }
}
