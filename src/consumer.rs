//! NATS message consumer for incoming transactions

use crate::error::ScoringError;
use crate::types::transaction::Transaction;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Consumer for receiving transactions from NATS
pub struct TransactionConsumer {
    client: Client,
    subject: String,
}

impl TransactionConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Subscribe to the transaction subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to transaction subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode a message payload, mapping malformed JSON to a validation error
pub fn decode_transaction(payload: &[u8]) -> Result<Transaction, ScoringError> {
    serde_json::from_slice(payload).map_err(|e| ScoringError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_payload() {
        let payload = br#"{"transaction_id":"t1","user_id":1000,"amount":50.0,"timestamp":"2024-01-10 12:00:00","merchant_category":"Dining"}"#;
        let tx = decode_transaction(payload).unwrap();
        assert_eq!(tx.user_id, 1000);
        assert_eq!(tx.amount, 50.0);
    }

    #[test]
    fn test_non_numeric_amount_is_validation_error() {
        let payload = br#"{"transaction_id":"t1","user_id":1000,"amount":"fifty","timestamp":"2024-01-10 12:00:00","merchant_category":"Dining"}"#;
        let err = decode_transaction(payload).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_garbage_is_validation_error() {
        assert!(matches!(
            decode_transaction(b"not json"),
            Err(ScoringError::Validation(_))
        ));
    }
}
