//! Decision and fraud alert data structures

use crate::features::FeatureVector;
use crate::types::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of thresholding a fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "FLAGGED (Manual Review)")]
    Flagged,
    #[serde(rename = "REJECTED (High Risk)")]
    Rejected,
}

impl Decision {
    /// Whether this outcome must be reported to the alert sink
    pub fn requires_alert(self) -> bool {
        !matches!(self, Decision::Approved)
    }

    /// Short code used for metrics and log fields
    pub fn code(self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Flagged => "flagged",
            Decision::Rejected => "rejected",
        }
    }

    /// Label returned to API callers
    pub fn label(self) -> &'static str {
        match self {
            Decision::Approved => "APPROVED",
            Decision::Flagged => "FLAGGED (Manual Review)",
            Decision::Rejected => "REJECTED (High Risk)",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A decision together with the probability that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDecision {
    pub decision: Decision,
    pub probability: f64,
    pub decided_at: DateTime<Utc>,
}

/// Alert emitted for every flagged or rejected transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Associated transaction
    pub transaction_id: String,
    pub user_id: i64,
    pub amount: f64,
    pub merchant_category: String,
    pub location: String,
    pub device_id: String,

    /// Behavioral context at decision time
    pub tx_count_24h: u32,
    pub avg_spend_user: f64,
    pub amount_deviation: f64,

    /// Classifier output (0.0 - 1.0)
    pub fraud_probability: f64,

    pub decision: Decision,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl FraudAlert {
    pub fn new(tx: &Transaction, features: &FeatureVector, scored: &ScoredDecision) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: tx.transaction_id.clone(),
            user_id: tx.user_id,
            amount: tx.amount,
            merchant_category: tx.merchant_category.clone(),
            location: tx.location.clone(),
            device_id: tx.device_id.clone(),
            tx_count_24h: features.tx_count_24h,
            avg_spend_user: features.avg_spend_user,
            amount_deviation: features.amount_deviation,
            fraud_probability: scored.probability,
            decision: scored.decision,
            timestamp: scored.decided_at,
        }
    }

    /// Human-readable one-line summary for log and console channels
    pub fn summary(&self) -> String {
        format!(
            "SUSPICIOUS ACTIVITY: user {} | amount ${:.2} | prob {:.2}% | {}",
            self.user_id,
            self.amount,
            self.fraud_probability * 100.0,
            self.decision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_labels_match_api_contract() {
        assert_eq!(
            serde_json::to_string(&Decision::Flagged).unwrap(),
            "\"FLAGGED (Manual Review)\""
        );
        assert_eq!(
            serde_json::to_string(&Decision::Rejected).unwrap(),
            "\"REJECTED (High Risk)\""
        );
        assert_eq!(Decision::Approved.to_string(), "APPROVED");
    }

    #[test]
    fn test_only_non_approved_decisions_alert() {
        assert!(!Decision::Approved.requires_alert());
        assert!(Decision::Flagged.requires_alert());
        assert!(Decision::Rejected.requires_alert());
    }

    #[test]
    fn test_alert_carries_transaction_context() {
        let tx = Transaction::new("tx_9", 1000, 3000.0, Utc::now(), "Electronics");
        let features = FeatureVector {
            amount: 3000.0,
            hour_of_day: 1,
            day_of_week: 4,
            tx_count_24h: 2,
            avg_spend_user: 1525.0,
            amount_deviation: 3000.0 / 1525.0,
            merchant_cat_code: 1,
        };
        let scored = ScoredDecision {
            decision: Decision::Rejected,
            probability: 0.85,
            decided_at: Utc::now(),
        };

        let alert = FraudAlert::new(&tx, &features, &scored);
        assert_eq!(alert.transaction_id, "tx_9");
        assert_eq!(alert.tx_count_24h, 2);
        assert_eq!(alert.decision, Decision::Rejected);
        assert!(alert.summary().contains("REJECTED (High Risk)"));
        assert!(alert.summary().contains("85.00%"));
    }
}
