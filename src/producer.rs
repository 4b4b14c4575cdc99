//! NATS publishers for fraud alerts and scoring responses

use crate::types::alert::FraudAlert;
use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tracing::debug;

/// Publishes fraud alerts to NATS
#[derive(Clone)]
pub struct AlertProducer {
    client: Client,
    subject: String,
}

impl AlertProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a fraud alert
    pub async fn publish(&self, alert: &FraudAlert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id,
            fraud_probability = alert.fraud_probability,
            "Published fraud alert"
        );

        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Publishes scoring responses and errors, and answers request/reply callers
#[derive(Clone)]
pub struct DecisionPublisher {
    client: Client,
    subject: String,
}

impl DecisionPublisher {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish `body` on the decision subject and, if present, the reply subject
    pub async fn publish<T: Serialize>(&self, body: &T, reply: Option<Subject>) -> Result<()> {
        let payload = serde_json::to_vec(body)?;

        if let Some(reply) = reply {
            self.client.publish(reply, payload.clone().into()).await?;
        }
        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
