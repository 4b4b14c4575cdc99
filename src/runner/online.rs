//! Live, one-transaction-at-a-time scoring

use crate::decision::{DecisionEngine, DecisionOutcome};
use crate::error::ScoringError;
use crate::features::{CategoryEncoding, FeatureBuilder, FeatureVector, WindowTable};
use crate::metrics::PipelineMetrics;
use crate::models::Classifier;
use crate::types::response::ScoringResponse;
use crate::types::transaction::Transaction;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Everything produced for one scored transaction
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub transaction_id: String,
    pub user_id: i64,
    pub features: FeatureVector,
    pub decision: DecisionOutcome,
}

impl ScoringOutcome {
    pub fn response(&self) -> ScoringResponse {
        ScoringResponse::new(self.user_id, &self.decision.scored)
    }
}

/// Online scoring pipeline.
///
/// Window aggregates always come from the shared `WindowTable`; callers
/// cannot supply them. A transaction is recorded into its user's window as
/// soon as it passes validation and ordering checks, so a later classifier
/// failure does not rewind the user's history.
pub struct OnlineRunner {
    table: Arc<WindowTable>,
    builder: FeatureBuilder,
    classifier: Arc<dyn Classifier>,
    engine: DecisionEngine,
    timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl OnlineRunner {
    pub fn new(
        encoding: Arc<CategoryEncoding>,
        classifier: Arc<dyn Classifier>,
        engine: DecisionEngine,
        timeout: Duration,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            table: Arc::new(WindowTable::new()),
            builder: FeatureBuilder::new(encoding),
            classifier,
            engine,
            timeout,
            metrics,
        }
    }

    /// Use an existing state table, e.g. one shared with an idle sweeper
    pub fn with_table(mut self, table: Arc<WindowTable>) -> Self {
        self.table = table;
        self
    }

    pub fn table(&self) -> &Arc<WindowTable> {
        &self.table
    }

    /// Score one transaction end to end
    pub async fn score(&self, tx: &Transaction) -> Result<ScoringOutcome, ScoringError> {
        let started = Instant::now();
        let result = self.score_inner(tx).await;

        match &result {
            Ok(outcome) => self.metrics.record_decision(
                started.elapsed(),
                outcome.decision.scored.probability,
                outcome.decision.scored.decision,
            ),
            Err(e) => self.metrics.record_error(e.kind()),
        }
        result
    }

    async fn score_inner(&self, tx: &Transaction) -> Result<ScoringOutcome, ScoringError> {
        tx.validate()?;

        let snap = self
            .table
            .record(tx.user_id, tx.timestamp, tx.amount)
            .await?;
        let features = self
            .builder
            .build(tx, snap.tx_count_24h, snap.avg_spend_user)?;

        let probability = self.classify(features).await?;
        let decision = self.engine.decide(tx, &features, probability);

        debug!(
            transaction_id = %tx.transaction_id,
            user_id = tx.user_id,
            tx_count_24h = features.tx_count_24h,
            avg_spend_user = features.avg_spend_user,
            probability,
            decision = decision.scored.decision.code(),
            "Transaction scored"
        );

        Ok(ScoringOutcome {
            transaction_id: tx.transaction_id.clone(),
            user_id: tx.user_id,
            features,
            decision,
        })
    }

    /// Run the classifier off the async workers, bounded by the timeout
    async fn classify(&self, features: FeatureVector) -> Result<f64, ScoringError> {
        let classifier = Arc::clone(&self.classifier);
        let task = tokio::task::spawn_blocking(move || classifier.score(&features));

        let joined = tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| ScoringError::ScoringTimeout(self.timeout))?;
        let probability = joined
            .map_err(|e| ScoringError::ScoringUnavailable(format!("classifier task failed: {e}")))?
            .map_err(|e| ScoringError::ScoringUnavailable(format!("{e:#}")))?;

        if !(0.0..=1.0).contains(&probability) {
            return Err(ScoringError::ScoringUnavailable(format!(
                "classifier returned {probability}, outside [0, 1]"
            )));
        }
        Ok(probability)
    }
}
