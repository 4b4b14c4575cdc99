//! Batch and online execution modes.
//!
//! Both drive the same `UserState::record` and `FeatureBuilder::build`, so a
//! history replayed in batch yields the same features the online path
//! computed as each transaction arrived, provided each user's transactions
//! reach the online runner in order. `ShardedScorer` guarantees that.

pub mod batch;
pub mod online;
pub mod shard;

pub use batch::{read_transactions, write_featured, BatchRunner, FeaturedRow};
pub use online::{OnlineRunner, ScoringOutcome};
pub use shard::{ScoredMessage, ShardedScorer};
