//! Transaction data structures shared by the batch and online paths

use crate::error::ScoringError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wall-clock format used by the historical CSV exports. Fractional seconds
/// are optional on input and written only when non-zero.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single payment event as it arrives from upstream.
///
/// The same shape is read from historical CSV rows and from live JSON
/// messages, so both execution modes see identical field semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier
    pub transaction_id: String,

    /// Account the transaction belongs to
    pub user_id: i64,

    /// Transaction amount, strictly positive
    pub amount: f64,

    /// Event time, interpreted as UTC
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,

    /// Merchant category name, encoded through the persisted category table
    pub merchant_category: String,

    /// City or region reported by the acquirer
    #[serde(default)]
    pub location: String,

    /// Device or network fingerprint
    #[serde(default)]
    pub device_id: String,

    /// Ground-truth label, only present in historical data
    #[serde(default, alias = "is_fraud_label")]
    pub is_fraud: Option<u8>,
}

impl Transaction {
    /// Create an unlabelled transaction with empty location and device fields
    pub fn new(
        transaction_id: impl Into<String>,
        user_id: i64,
        amount: f64,
        timestamp: DateTime<Utc>,
        merchant_category: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id,
            amount,
            timestamp,
            merchant_category: merchant_category.into(),
            location: String::new(),
            device_id: String::new(),
            is_fraud: None,
        }
    }

    /// Check the fields the feature engine depends on.
    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.transaction_id.trim().is_empty() {
            return Err(ScoringError::Validation(
                "transaction_id is missing".to_string(),
            ));
        }
        if !self.amount.is_finite() {
            return Err(ScoringError::Validation(format!(
                "amount is not numeric for transaction {}",
                self.transaction_id
            )));
        }
        if self.amount <= 0.0 {
            return Err(ScoringError::Validation(format!(
                "amount must be positive, got {} for transaction {}",
                self.amount, self.transaction_id
            )));
        }
        if self.merchant_category.trim().is_empty() {
            return Err(ScoringError::Validation(format!(
                "merchant_category is missing for transaction {}",
                self.transaction_id
            )));
        }
        Ok(())
    }
}

/// Parse a timestamp in either the CSV wall-clock format (UTC) or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string())
}

pub(crate) fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Transaction {
        Transaction::new(
            "tx_1",
            1000,
            50.0,
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            "Groceries",
        )
    }

    #[test]
    fn test_parse_both_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01 09:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T09:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T11:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_fractional_seconds_survive_serialization() {
        let ts = parse_timestamp("2024-01-01T10:00:00.750+02:00").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 750);

        let mut tx = sample();
        tx.timestamp = ts;
        let json = serde_json::to_string(&tx).unwrap();
        assert!(json.contains("\"2024-01-01 08:00:00.750\""));

        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back.timestamp, ts);
    }

    #[test]
    fn test_whole_seconds_written_without_fraction() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"2024-03-01 09:30:00\""));
    }

    #[test]
    fn test_json_accepts_producer_label_alias() {
        let json = r#"{
            "transaction_id": "abc",
            "user_id": 1042,
            "amount": 12.5,
            "timestamp": "2024-03-01 09:30:00",
            "merchant_category": "Dining",
            "location": "Lyon",
            "device_id": "10.0.0.1",
            "is_fraud_label": 1
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.user_id, 1042);
        assert_eq!(tx.is_fraud, Some(1));
        assert_eq!(tx.location, "Lyon");
    }

    #[test]
    fn test_missing_amount_fails_to_decode() {
        let json = r#"{"transaction_id": "abc", "user_id": 1, "timestamp": "2024-03-01 09:30:00", "merchant_category": "Dining"}"#;
        assert!(serde_json::from_str::<Transaction>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_amounts() {
        let mut tx = sample();
        assert!(tx.validate().is_ok());

        tx.amount = 0.0;
        assert!(matches!(tx.validate(), Err(ScoringError::Validation(_))));

        tx.amount = f64::NAN;
        assert!(matches!(tx.validate(), Err(ScoringError::Validation(_))));

        tx.amount = -3.0;
        assert!(matches!(tx.validate(), Err(ScoringError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_blank_category() {
        let mut tx = sample();
        tx.merchant_category = "  ".to_string();
        assert!(matches!(tx.validate(), Err(ScoringError::Validation(_))));
    }
}
