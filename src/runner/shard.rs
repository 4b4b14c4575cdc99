//! Per-user ordered dispatch for the online service.
//!
//! Messages are routed to one of `shards` bounded queues by `user_id`, and
//! each queue is drained by a single task. A user's transactions are therefore
//! scored strictly in arrival order, while different users spread across
//! shards and score in parallel.

use crate::error::ScoringError;
use crate::runner::online::{OnlineRunner, ScoringOutcome};
use crate::types::transaction::Transaction;
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Result of one submitted message, with the caller's context attached
#[derive(Debug)]
pub struct ScoredMessage<C> {
    pub context: C,
    pub transaction_id: Option<String>,
    pub result: Result<ScoringOutcome, ScoringError>,
}

struct Job<C> {
    context: C,
    transaction: Result<Transaction, ScoringError>,
}

/// Fixed set of ordered scoring queues
pub struct ShardedScorer<C> {
    shards: Vec<mpsc::Sender<Job<C>>>,
    // round-robin cursor for payloads that never decoded
    next_rejected: AtomicUsize,
}

impl<C: Send + 'static> ShardedScorer<C> {
    /// Start `shards` scoring tasks, each with a queue of `capacity` messages.
    ///
    /// Every scored message is forwarded to `output`. The tasks stop once the
    /// scorer is dropped and their queues are drained.
    pub fn spawn(
        runner: Arc<OnlineRunner>,
        shards: usize,
        capacity: usize,
        output: mpsc::Sender<ScoredMessage<C>>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let shards = shards.max(1);
        let mut senders = Vec::with_capacity(shards);
        let mut handles = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(drain_shard(
                shard,
                rx,
                runner.clone(),
                output.clone(),
            )));
        }

        let scorer = Self {
            shards: senders,
            next_rejected: AtomicUsize::new(0),
        };
        (scorer, handles)
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Queue index owning `user_id`
    pub fn shard_for(&self, user_id: i64) -> usize {
        user_id.rem_euclid(self.shards.len() as i64) as usize
    }

    /// Queue a decoded (or undecodable) message, waiting while its shard is full
    pub async fn submit(
        &self,
        context: C,
        transaction: Result<Transaction, ScoringError>,
    ) -> Result<()> {
        let shard = match &transaction {
            Ok(tx) => self.shard_for(tx.user_id),
            Err(_) => self.next_rejected.fetch_add(1, Ordering::Relaxed) % self.shards.len(),
        };

        self.shards[shard]
            .send(Job {
                context,
                transaction,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Scoring shard {shard} has stopped"))
    }
}

async fn drain_shard<C>(
    shard: usize,
    mut rx: mpsc::Receiver<Job<C>>,
    runner: Arc<OnlineRunner>,
    output: mpsc::Sender<ScoredMessage<C>>,
) {
    debug!(shard, "Scoring shard started");

    while let Some(job) = rx.recv().await {
        let (transaction_id, result) = match job.transaction {
            Ok(tx) => (Some(tx.transaction_id.clone()), runner.score(&tx).await),
            Err(e) => (None, Err(e)),
        };

        let scored = ScoredMessage {
            context: job.context,
            transaction_id,
            result,
        };
        if output.send(scored).await.is_err() {
            debug!(shard, "Result receiver closed");
            break;
        }
    }

    debug!(shard, "Scoring shard stopped");
}
