//! Type definitions for the fraud monitoring engine

pub mod alert;
pub mod response;
pub mod transaction;

pub use alert::{Decision, FraudAlert, ScoredDecision};
pub use response::{ErrorResponse, HealthResponse, ScoringResponse};
pub use transaction::Transaction;
