//! Batch feature replay
//!
//! Reads a historical transaction CSV, replays it through the same window
//! aggregates the online service uses and writes the featured CSV.
//!
//! ```bash
//! # Fit a new category table from the history
//! batch-features --input history.csv --output featured.csv --encoding-out models/encoding.json
//!
//! # Reuse the table a deployed model was trained with
//! batch-features --input history.csv --output featured.csv --encoding models/encoding.json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fraud_monitoring::features::CategoryEncoding;
use fraud_monitoring::runner::{read_transactions, write_featured, BatchRunner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser)]
#[command(name = "batch-features")]
#[command(about = "Compute behavioral features over a transaction history")]
#[command(version)]
struct Cli {
    /// Historical transactions CSV
    #[arg(short, long)]
    input: PathBuf,

    /// Featured CSV to write
    #[arg(short, long)]
    output: PathBuf,

    /// Existing category encoding table to apply instead of fitting one
    #[arg(long, conflicts_with = "encoding_out")]
    encoding: Option<PathBuf>,

    /// Where to persist the fitted category encoding table
    #[arg(long)]
    encoding_out: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("fraud_monitoring={level}").parse()?)
                .add_directive(format!("batch_features={level}").parse()?),
        )
        .init();

    let started = Instant::now();
    let transactions = read_transactions(&cli.input)?;

    let runner = match &cli.encoding {
        Some(path) => BatchRunner::new(Arc::new(CategoryEncoding::load(path)?)),
        None => BatchRunner::fit(&transactions),
    };
    info!(
        categories = runner.encoding().len(),
        encoding_version = %runner.encoding().version(),
        "Category encoding ready"
    );

    let rows = runner
        .run(transactions)
        .with_context(|| format!("Feature replay failed for {}", cli.input.display()))?;
    write_featured(&cli.output, &rows)?;

    if let Some(path) = &cli.encoding_out {
        runner.encoding().save(path)?;
        info!(path = %path.display(), "Category encoding saved");
    }

    info!(
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Batch run complete"
    );
    Ok(())
}
