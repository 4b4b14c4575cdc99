//! Offline feature replay over a complete transaction history

use crate::error::ScoringError;
use crate::features::{CategoryEncoding, FeatureBuilder, FeatureVector, WindowedAggregator};
use crate::types::transaction::{deserialize_timestamp, serialize_timestamp, Transaction};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Columns every history file must carry
pub const REQUIRED_COLUMNS: &[&str] = &[
    "transaction_id",
    "user_id",
    "amount",
    "timestamp",
    "merchant_category",
    "location",
    "device_id",
];

/// An input row plus its derived feature columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturedRow {
    pub transaction_id: String,
    pub user_id: i64,
    pub amount: f64,
    #[serde(
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: DateTime<Utc>,
    pub merchant_category: String,
    pub location: String,
    pub device_id: String,
    pub is_fraud: Option<u8>,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub tx_count_24h: u32,
    pub avg_spend_user: f64,
    pub amount_deviation: f64,
    pub merchant_cat_code: i32,
}

impl FeaturedRow {
    pub fn new(tx: Transaction, features: &FeatureVector) -> Self {
        Self {
            transaction_id: tx.transaction_id,
            user_id: tx.user_id,
            amount: tx.amount,
            timestamp: tx.timestamp,
            merchant_category: tx.merchant_category,
            location: tx.location,
            device_id: tx.device_id,
            is_fraud: tx.is_fraud,
            hour_of_day: features.hour_of_day,
            day_of_week: features.day_of_week,
            tx_count_24h: features.tx_count_24h,
            avg_spend_user: features.avg_spend_user,
            amount_deviation: features.amount_deviation,
            merchant_cat_code: features.merchant_cat_code,
        }
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            amount: self.amount,
            hour_of_day: self.hour_of_day,
            day_of_week: self.day_of_week,
            tx_count_24h: self.tx_count_24h,
            avg_spend_user: self.avg_spend_user,
            amount_deviation: self.amount_deviation,
            merchant_cat_code: self.merchant_cat_code,
        }
    }
}

/// Deterministic replay of a static history through the window aggregates
pub struct BatchRunner {
    builder: FeatureBuilder,
}

impl BatchRunner {
    /// Replay against an existing encoding table
    pub fn new(encoding: Arc<CategoryEncoding>) -> Self {
        Self {
            builder: FeatureBuilder::new(encoding),
        }
    }

    /// Fit a fresh encoding table over the history's categories
    pub fn fit(transactions: &[Transaction]) -> Self {
        let encoding =
            CategoryEncoding::fit(transactions.iter().map(|tx| tx.merchant_category.as_str()));
        Self::new(Arc::new(encoding))
    }

    pub fn encoding(&self) -> &CategoryEncoding {
        self.builder.encoding()
    }

    /// Compute features for every transaction.
    ///
    /// Rows are stably sorted by `(user_id, timestamp)` first, so ties keep
    /// their input order. The output comes back in that sorted order.
    pub fn run(&self, mut transactions: Vec<Transaction>) -> Result<Vec<FeaturedRow>, ScoringError> {
        transactions.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });

        let mut aggregator = WindowedAggregator::new();
        let mut rows = Vec::with_capacity(transactions.len());

        for tx in transactions {
            tx.validate()?;
            let snap = aggregator.record(tx.user_id, tx.timestamp, tx.amount)?;
            let features = self
                .builder
                .build(&tx, snap.tx_count_24h, snap.avg_spend_user)?;
            rows.push(FeaturedRow::new(tx, &features));
        }

        info!(
            rows = rows.len(),
            users = aggregator.user_count(),
            encoding_version = %self.encoding().version(),
            "Batch feature replay complete"
        );
        Ok(rows)
    }
}

/// Read a historical CSV, checking its header first
pub fn read_transactions<P: AsRef<Path>>(path: P) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open input {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        anyhow::bail!(
            "Schema mismatch in {}: missing column(s) {}",
            path.display(),
            missing.join(", ")
        );
    }

    let mut transactions = Vec::new();
    for (i, record) in reader.deserialize::<Transaction>().enumerate() {
        // header is line 1
        let tx = record.with_context(|| format!("Invalid row at line {}", i + 2))?;
        transactions.push(tx);
    }

    info!(path = %path.display(), rows = transactions.len(), "History loaded");
    Ok(transactions)
}

/// Write featured rows as CSV
pub fn write_featured<P: AsRef<Path>>(path: P, rows: &[FeaturedRow]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Featured history written");
    Ok(())
}
