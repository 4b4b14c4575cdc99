//! Probability thresholding and the alert side effect

use crate::alerts::AlertSink;
use crate::error::AlertDeliveryFailure;
use crate::features::FeatureVector;
use crate::types::alert::{Decision, FraudAlert, ScoredDecision};
use crate::types::transaction::Transaction;
use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Decision thresholds.
///
/// `p > reject` rejects, `flag < p <= reject` flags, `p <= flag` approves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionThresholds {
    pub flag_threshold: f64,
    pub reject_threshold: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            flag_threshold: 0.5,
            reject_threshold: 0.8,
        }
    }
}

impl DecisionThresholds {
    pub fn validate(&self) -> Result<()> {
        let Self {
            flag_threshold: flag,
            reject_threshold: reject,
        } = *self;
        if !(0.0..=1.0).contains(&flag) || !(0.0..=1.0).contains(&reject) || flag >= reject {
            anyhow::bail!(
                "decision thresholds must satisfy 0 <= flag < reject <= 1, got flag={flag} reject={reject}"
            );
        }
        Ok(())
    }

    /// Pure mapping from probability to decision
    pub fn classify(&self, probability: f64) -> Decision {
        if probability > self.reject_threshold {
            Decision::Rejected
        } else if probability > self.flag_threshold {
            Decision::Flagged
        } else {
            Decision::Approved
        }
    }
}

/// Result of deciding on one transaction
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub scored: ScoredDecision,
    /// Alert handed to the sink, if the decision required one
    pub alert: Option<FraudAlert>,
    /// Set when the sink refused the alert; the decision stands regardless
    pub alert_warning: Option<AlertDeliveryFailure>,
}

/// Stateless decision engine with an injected alert sink
#[derive(Clone)]
pub struct DecisionEngine {
    thresholds: DecisionThresholds,
    sink: Arc<dyn AlertSink>,
}

impl DecisionEngine {
    pub fn new(thresholds: DecisionThresholds, sink: Arc<dyn AlertSink>) -> Self {
        Self { thresholds, sink }
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    /// Decide on `tx` and notify the sink once if the outcome is not approved.
    pub fn decide(
        &self,
        tx: &Transaction,
        features: &FeatureVector,
        probability: f64,
    ) -> DecisionOutcome {
        let scored = ScoredDecision {
            decision: self.thresholds.classify(probability),
            probability,
            decided_at: Utc::now(),
        };

        if !scored.decision.requires_alert() {
            return DecisionOutcome {
                scored,
                alert: None,
                alert_warning: None,
            };
        }

        let alert = FraudAlert::new(tx, features, &scored);
        let alert_warning = match self.sink.notify(&alert) {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    alert_id = %alert.alert_id,
                    error = %e,
                    "Alert not delivered"
                );
                Some(e)
            }
        };

        DecisionOutcome {
            scored,
            alert: Some(alert),
            alert_warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<FraudAlert>>,
    }

    impl AlertSink for RecordingSink {
        fn notify(&self, alert: &FraudAlert) -> Result<(), AlertDeliveryFailure> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl AlertSink for FailingSink {
        fn notify(&self, _alert: &FraudAlert) -> Result<(), AlertDeliveryFailure> {
            Err(AlertDeliveryFailure::Channel {
                channel: "test",
                reason: "unreachable".to_string(),
            })
        }
    }

    fn inputs() -> (Transaction, FeatureVector) {
        let tx = Transaction::new("tx_1", 1000, 3000.0, Utc::now(), "Electronics");
        let features = FeatureVector {
            amount: 3000.0,
            hour_of_day: 13,
            day_of_week: 2,
            tx_count_24h: 2,
            avg_spend_user: 1525.0,
            amount_deviation: 3000.0 / 1525.0,
            merchant_cat_code: 1,
        };
        (tx, features)
    }

    #[test]
    fn test_threshold_boundaries() {
        let t = DecisionThresholds::default();
        assert_eq!(t.classify(0.0), Decision::Approved);
        assert_eq!(t.classify(0.5), Decision::Approved);
        assert_eq!(t.classify(0.50001), Decision::Flagged);
        assert_eq!(t.classify(0.8), Decision::Flagged);
        assert_eq!(t.classify(0.80001), Decision::Rejected);
        assert_eq!(t.classify(1.0), Decision::Rejected);
    }

    #[test]
    fn test_alert_fired_once_per_non_approved_decision() {
        let sink = Arc::new(RecordingSink::default());
        let engine = DecisionEngine::new(DecisionThresholds::default(), sink.clone());
        let (tx, features) = inputs();

        for (p, expected, alerts) in [
            (0.5, Decision::Approved, 0),
            (0.50001, Decision::Flagged, 1),
            (0.8, Decision::Flagged, 2),
            (0.80001, Decision::Rejected, 3),
        ] {
            let outcome = engine.decide(&tx, &features, p);
            assert_eq!(outcome.scored.decision, expected);
            assert_eq!(outcome.alert.is_some(), expected.requires_alert());
            assert_eq!(sink.alerts.lock().unwrap().len(), alerts);
        }
    }

    #[test]
    fn test_sink_failure_keeps_decision_and_surfaces_warning() {
        let engine = DecisionEngine::new(DecisionThresholds::default(), Arc::new(FailingSink));
        let (tx, features) = inputs();

        let outcome = engine.decide(&tx, &features, 0.85);
        assert_eq!(outcome.scored.decision, Decision::Rejected);
        assert_eq!(outcome.scored.probability, 0.85);
        assert!(matches!(
            outcome.alert_warning,
            Some(AlertDeliveryFailure::Channel { .. })
        ));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(DecisionThresholds::default().validate().is_ok());
        assert!(DecisionThresholds {
            flag_threshold: 0.8,
            reject_threshold: 0.5,
        }
        .validate()
        .is_err());
        assert!(DecisionThresholds {
            flag_threshold: -0.1,
            reject_threshold: 0.5,
        }
        .validate()
        .is_err());
    }
}
