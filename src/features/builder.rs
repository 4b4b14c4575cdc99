//! Feature construction for fraud model inference.
//!
//! Turns a transaction plus its window aggregates into the feature vector in
//! the exact order the model was fit against. Batch replay and online
//! scoring both go through `FeatureBuilder::build`.

use crate::error::ScoringError;
use crate::features::encoding::CategoryEncoding;
use crate::features::layout::FEATURE_COUNT;
use crate::types::transaction::Transaction;
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Guards the deviation ratio against a zero spend baseline
pub const DEVIATION_EPSILON: f64 = 1e-9;

/// Model input for one transaction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub amount: f64,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub tx_count_24h: u32,
    pub avg_spend_user: f64,
    pub amount_deviation: f64,
    pub merchant_cat_code: i32,
}

impl FeatureVector {
    /// Values in `FEATURE_LAYOUT` order
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.amount,
            self.hour_of_day as f64,
            self.day_of_week as f64,
            self.tx_count_24h as f64,
            self.avg_spend_user,
            self.amount_deviation,
            self.merchant_cat_code as f64,
        ]
    }

    /// Values as the f32 tensor row ONNX models expect
    pub fn to_model_input(&self) -> Vec<f32> {
        self.values().iter().map(|&v| v as f32).collect()
    }
}

/// Builds feature vectors against a fixed category encoding.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    encoding: Arc<CategoryEncoding>,
}

impl FeatureBuilder {
    pub fn new(encoding: Arc<CategoryEncoding>) -> Self {
        Self { encoding }
    }

    /// Build the feature vector for `tx` given the aggregates recorded for it.
    ///
    /// Hour and weekday are taken in UTC, weekday counted from Monday = 0.
    pub fn build(
        &self,
        tx: &Transaction,
        tx_count_24h: u32,
        avg_spend_user: f64,
    ) -> Result<FeatureVector, ScoringError> {
        tx.validate()?;
        if !avg_spend_user.is_finite() || avg_spend_user < 0.0 {
            return Err(ScoringError::Validation(format!(
                "avg_spend_user must be a non-negative number, got {avg_spend_user}"
            )));
        }

        Ok(FeatureVector {
            amount: tx.amount,
            hour_of_day: tx.timestamp.hour(),
            day_of_week: tx.timestamp.weekday().num_days_from_monday(),
            tx_count_24h,
            avg_spend_user,
            amount_deviation: tx.amount / (avg_spend_user + DEVIATION_EPSILON),
            merchant_cat_code: self.encoding.code(&tx.merchant_category),
        })
    }

    pub fn encoding(&self) -> &CategoryEncoding {
        &self.encoding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::layout::FEATURE_LAYOUT;
    use chrono::{TimeZone, Utc};

    fn builder() -> FeatureBuilder {
        let encoding = CategoryEncoding::fit(
            ["Dining", "Electronics", "Groceries", "Travel"].iter().copied(),
        );
        FeatureBuilder::new(Arc::new(encoding))
    }

    fn tx(amount: f64) -> Transaction {
        // 2024-01-11 is a Thursday
        Transaction::new(
            "tx_1",
            1000,
            amount,
            Utc.with_ymd_and_hms(2024, 1, 11, 23, 15, 0).unwrap(),
            "Electronics",
        )
    }

    #[test]
    fn test_calendar_fields_are_utc() {
        let features = builder().build(&tx(10.0), 1, 10.0).unwrap();
        assert_eq!(features.hour_of_day, 23);
        assert_eq!(features.day_of_week, 3);
        assert_eq!(features.merchant_cat_code, 1);
    }

    #[test]
    fn test_deviation_formula() {
        let features = builder().build(&tx(3000.0), 2, 1525.0).unwrap();
        assert_eq!(features.amount_deviation, 3000.0 / (1525.0 + 1e-9));
        assert!((features.amount_deviation - 1.967).abs() < 1e-3);
    }

    #[test]
    fn test_first_transaction_deviation_is_one() {
        let features = builder().build(&tx(50.0), 1, 50.0).unwrap();
        assert!((features.amount_deviation - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_baseline_does_not_divide_by_zero() {
        let features = builder().build(&tx(5.0), 1, 0.0).unwrap();
        assert!(features.amount_deviation.is_finite());
        assert_eq!(features.amount_deviation, 5.0 / 1e-9);
    }

    #[test]
    fn test_values_follow_layout_order() {
        let features = builder().build(&tx(3000.0), 2, 1525.0).unwrap();
        let values = features.values();
        assert_eq!(values.len(), FEATURE_LAYOUT.len());
        assert_eq!(values[0], 3000.0);
        assert_eq!(values[3], 2.0);
        assert_eq!(values[4], 1525.0);
        assert_eq!(values[6], 1.0);
        assert_eq!(features.to_model_input().len(), FEATURE_COUNT);
    }

    #[test]
    fn test_invalid_inputs_are_validation_errors() {
        let b = builder();
        assert!(matches!(
            b.build(&tx(-1.0), 1, 10.0),
            Err(ScoringError::Validation(_))
        ));
        assert!(matches!(
            b.build(&tx(1.0), 1, f64::NAN),
            Err(ScoringError::Validation(_))
        ));
    }
}
