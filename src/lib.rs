//! Fraud Monitoring Library
//!
//! Real-time transaction scoring with per-user behavioral features that are
//! computed identically by the offline batch replay and the online service.

pub mod alerts;
pub mod config;
pub mod consumer;
pub mod decision;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod runner;
pub mod types;

pub use alerts::{AlertDispatcher, AlertSink, QueuedAlertSink};
pub use config::AppConfig;
pub use consumer::TransactionConsumer;
pub use decision::{DecisionEngine, DecisionOutcome, DecisionThresholds};
pub use error::{AlertDeliveryFailure, ScoringError};
pub use features::{CategoryEncoding, FeatureBuilder, FeatureVector, WindowedAggregator};
pub use models::{Classifier, OnnxClassifier};
pub use producer::{AlertProducer, DecisionPublisher};
pub use runner::{BatchRunner, OnlineRunner, ScoringOutcome};
pub use types::{Decision, FraudAlert, Transaction};
