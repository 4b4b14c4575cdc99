//! Configuration management for the fraud monitoring engine

use crate::decision::DecisionThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the service configuration
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Alert delivery channel
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannelKind {
    Log,
    File,
    Nats,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub model: ModelConfig,
    pub detection: DetectionConfig,
    pub window: WindowConfig,
    pub pipeline: PipelineConfig,
    pub alerts: AlertsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming transactions
    pub transaction_subject: String,
    /// Subject every scoring response is published on
    pub decision_subject: String,
    /// Subject for outgoing fraud alerts
    pub alert_subject: String,
    /// Request/reply subject answering with model and feature versions
    #[serde(default = "default_health_subject")]
    pub health_subject: String,
}

fn default_health_subject() -> String {
    "fraud.health".to_string()
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Directory holding manifest.json, the ONNX model and the encoding table
    pub artifact_dir: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Decision thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: f64,
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,
}

fn default_flag_threshold() -> f64 {
    0.5
}

fn default_reject_threshold() -> f64 {
    0.8
}

impl DetectionConfig {
    pub fn thresholds(&self) -> DecisionThresholds {
        DecisionThresholds {
            flag_threshold: self.flag_threshold,
            reject_threshold: self.reject_threshold,
        }
    }
}

/// Per-user state table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    /// Reclaim users idle for this long; 0 keeps every user for the process lifetime
    #[serde(default)]
    pub idle_eviction_secs: u64,
    /// How often the idle sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval() -> u64 {
    300
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of ordered scoring shards; a user always lands on the same one
    pub workers: usize,
    /// Pending messages each shard buffers before the consumer waits
    #[serde(default = "default_shard_queue")]
    pub shard_queue: usize,
    /// Classifier timeout in milliseconds
    pub timeout_ms: u64,
}

/// Alert delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Bounded alert queue size; alerts beyond it are dropped and counted
    pub queue_capacity: usize,
    pub channels: Vec<AlertChannelKind>,
    /// Target of the file channel
    #[serde(default = "default_alert_file")]
    pub file_path: String,
}

fn default_shard_queue() -> usize {
    256
}

fn default_alert_file() -> String {
    "alerts.log".to_string()
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from a file, with `FRAUD__SECTION__KEY` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FRAUD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.thresholds().validate()?;
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        if self.pipeline.shard_queue == 0 {
            anyhow::bail!("pipeline.shard_queue must be at least 1");
        }
        if self.pipeline.timeout_ms == 0 {
            anyhow::bail!("pipeline.timeout_ms must be positive");
        }
        if self.alerts.queue_capacity == 0 {
            anyhow::bail!("alerts.queue_capacity must be at least 1");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "transactions".to_string(),
                decision_subject: "fraud.decisions".to_string(),
                alert_subject: "fraud.alerts".to_string(),
                health_subject: default_health_subject(),
            },
            model: ModelConfig {
                artifact_dir: "models".to_string(),
                onnx_threads: 1,
            },
            detection: DetectionConfig {
                flag_threshold: default_flag_threshold(),
                reject_threshold: default_reject_threshold(),
            },
            window: WindowConfig {
                idle_eviction_secs: 0,
                sweep_interval_secs: default_sweep_interval(),
            },
            pipeline: PipelineConfig {
                workers: 4,
                shard_queue: default_shard_queue(),
                timeout_ms: 1000,
            },
            alerts: AlertsConfig {
                queue_capacity: 1024,
                channels: vec![AlertChannelKind::Log, AlertChannelKind::File],
                file_path: default_alert_file(),
            },
            metrics: MetricsConfig {
                report_interval_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
