//! Concurrent per-user state table for online scoring

use crate::error::ScoringError;
use crate::features::window::{trailing_window, UserState, WindowSnapshot};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Sharded map of per-user states, each behind its own async lock.
///
/// Different users proceed in parallel; transactions of the same user are
/// serialized on that user's lock. There is no table-wide lock.
#[derive(Debug)]
pub struct WindowTable {
    users: DashMap<i64, Arc<Mutex<UserState>>>,
    span: Duration,
}

impl WindowTable {
    pub fn new() -> Self {
        Self::with_span(trailing_window())
    }

    pub fn with_span(span: Duration) -> Self {
        Self {
            users: DashMap::new(),
            span,
        }
    }

    /// Record a transaction for `user_id` under that user's lock.
    ///
    /// The only await point is acquiring the lock. The update itself runs
    /// synchronously, so a cancelled caller either never touched the state or
    /// applied the whole update.
    pub async fn record(
        &self,
        user_id: i64,
        timestamp: DateTime<Utc>,
        amount: f64,
    ) -> Result<WindowSnapshot, ScoringError> {
        let slot = self.slot(user_id);
        let mut state = slot.lock().await;
        state.record(user_id, timestamp, amount, self.span)
    }

    fn slot(&self, user_id: i64) -> Arc<Mutex<UserState>> {
        Arc::clone(self.users.entry(user_id).or_default().value())
    }

    /// Copy of a user's current state
    pub async fn snapshot(&self, user_id: i64) -> Option<UserState> {
        let slot = self.users.get(&user_id).map(|s| Arc::clone(s.value()))?;
        let state = slot.lock().await;
        Some(state.clone())
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Drop users whose last event is older than `idle_for` before `now`.
    ///
    /// A slot is only removed while no request holds a handle to it. Removal
    /// resets that user's lifetime mean, so callers opt in explicitly.
    pub fn evict_idle(&self, now: DateTime<Utc>, idle_for: Duration) -> usize {
        let cutoff = now - idle_for;
        let before = self.users.len();

        self.users.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(state) => state.last_timestamp().is_some_and(|ts| ts > cutoff),
                Err(_) => true,
            }
        });

        let evicted = before.saturating_sub(self.users.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.users.len(), "Evicted idle user states");
        }
        evicted
    }
}

impl Default for WindowTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_record_creates_user_lazily() {
        let table = WindowTable::new();
        assert_eq!(table.user_count(), 0);
        let snap = table.record(42, t0(), 80.0).await.unwrap();
        assert_eq!(snap.tx_count_24h, 1);
        assert_eq!(table.user_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_order_is_rejected() {
        let table = WindowTable::new();
        table.record(42, t0(), 80.0).await.unwrap();
        let err = table
            .record(42, t0() - Duration::seconds(1), 10.0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "out_of_order");

        let state = table.snapshot(42).await.unwrap();
        assert_eq!(state.lifetime_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_users_do_not_interfere() {
        let table = Arc::new(WindowTable::new());
        let mut handles = Vec::new();
        for user in 0..16_i64 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..20 {
                    table
                        .record(user, t0() + Duration::minutes(i), (user + 1) as f64)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(table.user_count(), 16);
        for user in 0..16_i64 {
            let state = table.snapshot(user).await.unwrap();
            assert_eq!(state.lifetime_count(), 20);
            assert_eq!(state.lifetime_sum(), 20.0 * (user + 1) as f64);
        }
    }

    #[tokio::test]
    async fn test_evict_idle_only_removes_stale_users() {
        let table = WindowTable::new();
        table.record(1, t0(), 10.0).await.unwrap();
        table.record(2, t0() + Duration::hours(5), 10.0).await.unwrap();

        let evicted = table.evict_idle(t0() + Duration::hours(6), Duration::hours(2));
        assert_eq!(evicted, 1);
        assert!(table.snapshot(1).await.is_none());
        assert!(table.snapshot(2).await.is_some());
    }

    #[tokio::test]
    async fn test_evict_idle_skips_locked_users() {
        let table = WindowTable::new();
        table.record(1, t0(), 10.0).await.unwrap();

        let slot = table.slot(1);
        let _guard = slot.lock().await;
        assert_eq!(table.evict_idle(t0() + Duration::days(30), Duration::hours(1)), 0);
    }
}
