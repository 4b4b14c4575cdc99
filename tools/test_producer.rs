//! Test Transaction Producer
//!
//! Publishes synthetic transactions to NATS for pipeline testing, or writes a
//! labelled history CSV for the batch replay.
//!
//! ```bash
//! test-producer --count 500 --delay-ms 50
//! test-producer --history 20000 --output history.csv
//! ```

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Parser;
use fraud_monitoring::Transaction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const LIVE_USERS: std::ops::RangeInclusive<i64> = 1000..=1100;
const HISTORY_USERS: std::ops::RangeInclusive<i64> = 1000..=1200;
const HISTORY_DAYS: i64 = 30;

const EVERYDAY_CATEGORIES: &[&str] = &["Groceries", "Dining", "Pharmacy", "Entertainment"];
const RISKY_CATEGORIES: &[&str] = &["Electronics", "Travel"];
const LOCATIONS: &[&str] = &["New York", "London", "Paris", "Berlin", "Toronto", "Madrid"];

#[derive(Parser)]
#[command(name = "test-producer")]
#[command(about = "Synthetic transaction generator")]
struct Cli {
    /// NATS server URL
    #[arg(long, default_value = "nats://localhost:4222")]
    nats_url: String,

    /// Subject to publish transactions on
    #[arg(long, default_value = "transactions")]
    subject: String,

    /// Number of live transactions to publish
    #[arg(short, long, default_value_t = 100)]
    count: u64,

    /// Share of high-value outliers in live mode
    #[arg(long, default_value_t = 0.05)]
    outlier_rate: f64,

    /// Pause between live transactions
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Write N labelled historical rows to CSV instead of publishing
    #[arg(long)]
    history: Option<usize>,

    /// History CSV destination
    #[arg(short, long, default_value = "history.csv")]
    output: PathBuf,

    /// RNG seed, for reproducible histories
    #[arg(long)]
    seed: Option<u64>,
}

/// Transaction generator for testing
struct TransactionGenerator {
    rng: StdRng,
}

impl TransactionGenerator {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    fn device(&mut self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.rng.gen_range(1..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(1..255)
        )
    }

    fn base(&mut self, user_id: i64, amount: f64, timestamp: DateTime<Utc>, category: &str) -> Transaction {
        let mut tx = Transaction::new(
            Uuid::new_v4().to_string(),
            user_id,
            (amount * 100.0).round() / 100.0,
            timestamp,
            category,
        );
        tx.location = self.random_choice(LOCATIONS).to_string();
        tx.device_id = self.device();
        tx
    }

    /// A live transaction stamped now; outliers are large amounts
    fn generate_live(&mut self, outlier_rate: f64) -> (Transaction, bool) {
        let user_id = self.rng.gen_range(LIVE_USERS);
        let outlier = self.rng.gen_bool(outlier_rate);
        let (amount, category) = if outlier {
            (self.rng.gen_range(1500.0..5000.0), self.random_choice(RISKY_CATEGORIES))
        } else {
            (self.rng.gen_range(5.0..150.0), self.random_choice(EVERYDAY_CATEGORIES))
        };
        (self.base(user_id, amount, Utc::now(), category), outlier)
    }

    /// A labelled row somewhere in the trailing history window
    fn generate_historical(&mut self, start: DateTime<Utc>) -> Transaction {
        let user_id = self.rng.gen_range(HISTORY_USERS);
        let offset = ChronoDuration::seconds(self.rng.gen_range(0..HISTORY_DAYS * 86_400));
        let fraud = self.rng.gen_bool(0.02);
        let (amount, category) = if fraud {
            (self.rng.gen_range(800.0..4000.0), self.random_choice(RISKY_CATEGORIES))
        } else {
            (self.rng.gen_range(5.0..200.0), self.random_choice(EVERYDAY_CATEGORIES))
        };
        let mut tx = self.base(user_id, amount, start + offset, category);
        tx.is_fraud = Some(u8::from(fraud));
        tx
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut generator = TransactionGenerator::new(cli.seed);

    if let Some(rows) = cli.history {
        return write_history(&mut generator, rows, &cli.output);
    }

    info!(
        nats_url = %cli.nats_url,
        subject = %cli.subject,
        count = cli.count,
        outlier_rate = cli.outlier_rate,
        delay_ms = cli.delay_ms,
        "Starting Test Transaction Producer"
    );

    let client = match async_nats::connect(&cli.nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&mut generator, &cli).await;
        }
    };

    let mut outliers = 0u64;
    for i in 0..cli.count {
        let (transaction, outlier) = generator.generate_live(cli.outlier_rate);
        outliers += u64::from(outlier);

        let payload = serde_json::to_vec(&transaction)?;
        client.publish(cli.subject.clone(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!("Published {}/{} transactions ({} outliers)", i + 1, cli.count, outliers);
        }

        tokio::time::sleep(Duration::from_millis(cli.delay_ms)).await;
    }
    client.flush().await?;

    info!(
        "Completed! Published {} transactions ({} outliers)",
        cli.count, outliers
    );
    Ok(())
}

async fn run_dry_mode(generator: &mut TransactionGenerator, cli: &Cli) -> Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    for i in 0..cli.count {
        let (transaction, _) = generator.generate_live(cli.outlier_rate);
        if (i + 1) % 10 == 0 || i == 0 {
            let json = serde_json::to_string_pretty(&transaction)?;
            info!("Sample transaction {}:\n{}", i + 1, json);
        }
        tokio::time::sleep(Duration::from_millis(cli.delay_ms)).await;
    }
    Ok(())
}

fn write_history(generator: &mut TransactionGenerator, rows: usize, output: &Path) -> Result<()> {
    let start = Utc::now() - ChronoDuration::days(HISTORY_DAYS);
    let mut history: Vec<Transaction> = (0..rows)
        .map(|_| generator.generate_historical(start))
        .collect();
    history.sort_by_key(|tx| tx.timestamp);

    let mut writer = csv::Writer::from_path(output)?;
    for tx in &history {
        writer.serialize(tx)?;
    }
    writer.flush()?;

    let frauds = history.iter().filter(|tx| tx.is_fraud == Some(1)).count();
    info!(
        path = %output.display(),
        rows = history.len(),
        frauds,
        "History written"
    );
    Ok(())
}
