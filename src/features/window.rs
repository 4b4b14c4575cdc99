//! Per-user trailing-window and expanding-mean state.
//!
//! `UserState::record` is the single definition of the behavioral
//! aggregates. The batch replay (`WindowedAggregator`) and the online table
//! (`WindowTable`) both call it, which is what keeps offline features and
//! serving features identical.

use crate::error::ScoringError;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

/// Trailing window length for the velocity feature
pub const WINDOW_HOURS: i64 = 24;

/// The default 24-hour trailing span
pub fn trailing_window() -> Duration {
    Duration::hours(WINDOW_HOURS)
}

/// Aggregates produced by recording one transaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSnapshot {
    /// Transactions in `(t - 24h, t]`, the current one included
    pub tx_count_24h: u32,
    /// Mean of every amount seen for the user so far, the current one included
    pub avg_spend_user: f64,
}

/// Mutable aggregation state for one user
#[derive(Debug, Clone, Default)]
pub struct UserState {
    window: VecDeque<(DateTime<Utc>, f64)>,
    lifetime_count: u64,
    lifetime_sum: f64,
}

impl UserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction and return the updated aggregates.
    ///
    /// Timestamps must be non-decreasing per user. An older timestamp is
    /// rejected before anything is touched, so a failed call leaves the state
    /// exactly as it was.
    pub fn record(
        &mut self,
        user_id: i64,
        timestamp: DateTime<Utc>,
        amount: f64,
        span: Duration,
    ) -> Result<WindowSnapshot, ScoringError> {
        if let Some(last_seen) = self.last_timestamp() {
            if timestamp < last_seen {
                return Err(ScoringError::OutOfOrder {
                    user_id,
                    timestamp,
                    last_seen,
                });
            }
        }

        let cutoff = timestamp - span;
        while let Some(&(ts, _)) = self.window.front() {
            if ts > cutoff {
                break;
            }
            self.window.pop_front();
        }
        self.window.push_back((timestamp, amount));

        self.lifetime_count += 1;
        self.lifetime_sum += amount;

        Ok(self.snapshot())
    }

    fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            tx_count_24h: self.window.len() as u32,
            avg_spend_user: self.lifetime_sum / self.lifetime_count as f64,
        }
    }

    /// Timestamp of the most recently recorded transaction
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.window.back().map(|&(ts, _)| ts)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_sum(&self) -> f64 {
        self.window.iter().map(|&(_, amount)| amount).sum()
    }

    pub fn lifetime_count(&self) -> u64 {
        self.lifetime_count
    }

    pub fn lifetime_sum(&self) -> f64 {
        self.lifetime_sum
    }
}

/// Single-owner aggregator used for batch replay.
///
/// No locking: one replay owns the whole table. Feed it a history sorted by
/// timestamp within each user.
#[derive(Debug, Clone)]
pub struct WindowedAggregator {
    users: HashMap<i64, UserState>,
    span: Duration,
}

impl WindowedAggregator {
    pub fn new() -> Self {
        Self::with_span(trailing_window())
    }

    pub fn with_span(span: Duration) -> Self {
        Self {
            users: HashMap::new(),
            span,
        }
    }

    /// Record a transaction for `user_id`, creating its state on first use.
    pub fn record(
        &mut self,
        user_id: i64,
        timestamp: DateTime<Utc>,
        amount: f64,
    ) -> Result<WindowSnapshot, ScoringError> {
        self.users
            .entry(user_id)
            .or_default()
            .record(user_id, timestamp, amount, self.span)
    }

    pub fn user(&self, user_id: i64) -> Option<&UserState> {
        self.users.get(&user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn span(&self) -> Duration {
        self.span
    }
}

impl Default for WindowedAggregator {
    fn default() -> Self {
        Self::new()
    }
}
