//! Wire-level scoring responses

use crate::error::ScoringError;
use crate::features::layout::{layout_hash, FEATURE_VERSION};
use crate::types::alert::{Decision, ScoredDecision};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Successful scoring response returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub user_id: i64,
    /// Probability rounded to 4 decimals
    pub fraud_probability: f64,
    pub decision: Decision,
    /// ISO-8601 decision time
    pub timestamp: String,
}

impl ScoringResponse {
    pub fn new(user_id: i64, scored: &ScoredDecision) -> Self {
        Self {
            user_id,
            fraud_probability: round4(scored.probability),
            decision: scored.decision,
            timestamp: iso8601(scored.decided_at),
        }
    }
}

/// Structured rejection, never a raw error chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl ErrorResponse {
    pub fn from_error(err: &ScoringError, transaction_id: Option<&str>) -> Self {
        Self {
            error: err.kind().to_string(),
            message: err.to_string(),
            transaction_id: transaction_id.map(str::to_string),
        }
    }
}

/// Reply on the health subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_version: String,
    pub feature_version: u8,
    /// CRC32 of the feature layout, hex
    pub layout_hash: String,
    pub encoding_version: String,
    pub users_tracked: usize,
    pub transactions_scored: u64,
    pub uptime_secs: u64,
}

impl HealthResponse {
    pub fn online(
        model_version: &str,
        encoding_version: &str,
        users_tracked: usize,
        transactions_scored: u64,
        uptime_secs: u64,
    ) -> Self {
        Self {
            status: "online".to_string(),
            model_version: model_version.to_string(),
            feature_version: FEATURE_VERSION,
            layout_hash: format!("{:08x}", layout_hash()),
            encoding_version: encoding_version.to_string(),
            users_tracked,
            transactions_scored,
            uptime_secs,
        }
    }
}

fn round4(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_probability_rounded_to_four_decimals() {
        let scored = ScoredDecision {
            decision: Decision::Flagged,
            probability: 0.612_345_6,
            decided_at: Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap(),
        };
        let response = ScoringResponse::new(1000, &scored);
        assert_eq!(response.fraud_probability, 0.6123);
        assert_eq!(response.timestamp, "2024-05-02T14:00:00.000000Z");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["decision"], "FLAGGED (Manual Review)");
        assert_eq!(json["user_id"], 1000);
    }

    #[test]
    fn test_health_reports_versions() {
        let health = HealthResponse::online("fraud-xgb-3", "1a2b3c4d", 12, 340, 60);
        assert_eq!(health.status, "online");
        assert_eq!(health.feature_version, FEATURE_VERSION);
        assert_eq!(health.layout_hash, format!("{:08x}", layout_hash()));

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["model_version"], "fraud-xgb-3");
        assert_eq!(json["encoding_version"], "1a2b3c4d");
        assert_eq!(json["users_tracked"], 12);
    }

    #[test]
    fn test_error_response_uses_error_kind() {
        let err = ScoringError::Validation("amount is missing".to_string());
        let response = ErrorResponse::from_error(&err, Some("tx_1"));
        assert_eq!(response.error, "validation_error");
        assert!(response.message.contains("amount is missing"));
        assert_eq!(response.transaction_id.as_deref(), Some("tx_1"));
    }
}
