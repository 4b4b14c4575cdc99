//! Alert sink boundary and fire-and-forget delivery.
//!
//! The decision engine only sees `AlertSink::notify`. In the service that
//! sink is a `QueuedAlertSink`: `notify` never blocks, it pushes onto a
//! bounded queue and reports a full queue as a delivery failure. The
//! `AlertDispatcher` drains the queue and fans each alert out to the
//! configured channels.

use crate::error::AlertDeliveryFailure;
use crate::metrics::PipelineMetrics;
use crate::producer::AlertProducer;
use crate::types::alert::FraudAlert;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tracing target used by the log channel
pub const ALERT_LOG_TARGET: &str = "fraud_alerts";

/// Receives every flagged or rejected decision
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &FraudAlert) -> Result<(), AlertDeliveryFailure>;
}

/// Non-blocking sink backed by a bounded queue
#[derive(Clone)]
pub struct QueuedAlertSink {
    tx: mpsc::Sender<FraudAlert>,
    metrics: Arc<PipelineMetrics>,
}

/// Create a sink and the receiving end for an `AlertDispatcher`
pub fn alert_queue(
    capacity: usize,
    metrics: Arc<PipelineMetrics>,
) -> (QueuedAlertSink, mpsc::Receiver<FraudAlert>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueuedAlertSink { tx, metrics }, rx)
}

impl AlertSink for QueuedAlertSink {
    fn notify(&self, alert: &FraudAlert) -> Result<(), AlertDeliveryFailure> {
        match self.tx.try_send(alert.clone()) {
            Ok(()) => {
                self.metrics.record_alert_enqueued();
                Ok(())
            }
            Err(TrySendError::Full(alert)) => {
                self.metrics.record_alert_dropped();
                Err(AlertDeliveryFailure::QueueFull {
                    alert_id: alert.alert_id,
                })
            }
            Err(TrySendError::Closed(alert)) => {
                self.metrics.record_alert_dropped();
                Err(AlertDeliveryFailure::QueueClosed {
                    alert_id: alert.alert_id,
                })
            }
        }
    }
}

/// Appends alerts as JSON lines to a file
pub struct FileAlertChannel {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileAlertChannel {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open alert file {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    async fn append(&self, alert: &FraudAlert) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(alert)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A delivery channel the dispatcher fans out to
pub enum AlertChannel {
    /// Structured log line on the `fraud_alerts` target
    Log,
    File(FileAlertChannel),
    Nats(AlertProducer),
}

impl AlertChannel {
    pub fn name(&self) -> &'static str {
        match self {
            AlertChannel::Log => "log",
            AlertChannel::File(_) => "file",
            AlertChannel::Nats(_) => "nats",
        }
    }

    pub async fn deliver(&self, alert: &FraudAlert) -> Result<(), AlertDeliveryFailure> {
        let outcome = match self {
            AlertChannel::Log => {
                warn!(
                    target: ALERT_LOG_TARGET,
                    alert_id = %alert.alert_id,
                    transaction_id = %alert.transaction_id,
                    user_id = alert.user_id,
                    amount = alert.amount,
                    fraud_probability = alert.fraud_probability,
                    decision = alert.decision.code(),
                    "{}",
                    alert.summary()
                );
                Ok(())
            }
            AlertChannel::File(channel) => channel.append(alert).await.map_err(|e| e.to_string()),
            AlertChannel::Nats(producer) => producer.publish(alert).await.map_err(|e| e.to_string()),
        };

        outcome.map_err(|reason| AlertDeliveryFailure::Channel {
            channel: self.name(),
            reason,
        })
    }
}

/// Drains the alert queue into the configured channels
pub struct AlertDispatcher {
    rx: mpsc::Receiver<FraudAlert>,
    channels: Vec<AlertChannel>,
    metrics: Arc<PipelineMetrics>,
}

impl AlertDispatcher {
    pub fn new(
        rx: mpsc::Receiver<FraudAlert>,
        channels: Vec<AlertChannel>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            rx,
            channels,
            metrics,
        }
    }

    /// Deliver alerts until every sender is dropped
    pub async fn run(mut self) {
        let names: Vec<&str> = self.channels.iter().map(AlertChannel::name).collect();
        info!(channels = ?names, "Alert dispatcher started");

        while let Some(alert) = self.rx.recv().await {
            for channel in &self.channels {
                match channel.deliver(&alert).await {
                    Ok(()) => debug!(
                        alert_id = %alert.alert_id,
                        channel = channel.name(),
                        "Alert delivered"
                    ),
                    Err(e) => {
                        self.metrics.record_alert_failure();
                        warn!(alert_id = %alert.alert_id, error = %e, "Alert delivery failed");
                    }
                }
            }
        }

        info!("Alert dispatcher stopped");
    }
}
