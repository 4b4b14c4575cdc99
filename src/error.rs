//! Error taxonomy for scoring requests and alert delivery

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Failure of a single scoring request.
///
/// None of these leave per-user state partially updated; the runner checks
/// everything that can fail before it mutates the window.
#[derive(Debug, Clone, Error)]
pub enum ScoringError {
    /// Malformed or missing transaction fields
    #[error("invalid transaction: {0}")]
    Validation(String),

    /// Event time older than the user's last recorded event
    #[error(
        "out-of-order transaction for user {user_id}: {timestamp} precedes last recorded {last_seen}"
    )]
    OutOfOrder {
        user_id: i64,
        timestamp: DateTime<Utc>,
        last_seen: DateTime<Utc>,
    },

    /// Classifier failed or produced an unusable probability
    #[error("classifier unavailable: {0}")]
    ScoringUnavailable(String),

    /// Classifier did not answer within the configured budget
    #[error("classifier did not respond within {0:?}")]
    ScoringTimeout(Duration),
}

impl ScoringError {
    /// Stable machine-readable kind for structured responses and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::Validation(_) => "validation_error",
            ScoringError::OutOfOrder { .. } => "out_of_order",
            ScoringError::ScoringUnavailable(_) => "scoring_unavailable",
            ScoringError::ScoringTimeout(_) => "scoring_timeout",
        }
    }
}

/// Alert could not be handed to or delivered by a channel.
///
/// Always reported as a warning next to the decision, never as a scoring failure.
#[derive(Debug, Clone, Error)]
pub enum AlertDeliveryFailure {
    #[error("alert queue full, alert {alert_id} dropped")]
    QueueFull { alert_id: String },

    #[error("alert queue closed, alert {alert_id} dropped")]
    QueueClosed { alert_id: String },

    #[error("alert channel '{channel}' failed: {reason}")]
    Channel {
        channel: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        let ts = Utc::now();
        assert_eq!(
            ScoringError::Validation("x".into()).kind(),
            "validation_error"
        );
        assert_eq!(
            ScoringError::OutOfOrder {
                user_id: 1,
                timestamp: ts,
                last_seen: ts,
            }
            .kind(),
            "out_of_order"
        );
        assert_eq!(
            ScoringError::ScoringTimeout(Duration::from_millis(5)).kind(),
            "scoring_timeout"
        );
    }
}
