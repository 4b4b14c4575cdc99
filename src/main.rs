//! Fraud Monitoring - Online Scoring Service
//!
//! Consumes transactions from NATS, scores them against per-user window
//! features, replies with the decision and dispatches alerts.

use anyhow::{Context, Result};
use fraud_monitoring::{
    alerts::{alert_queue, AlertChannel, AlertDispatcher, FileAlertChannel},
    config::{AlertChannelKind, AppConfig, LoggingConfig},
    consumer::{decode_transaction, TransactionConsumer},
    decision::DecisionEngine,
    features::WindowTable,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{Classifier, ModelArtifact, OnnxClassifier},
    producer::{AlertProducer, DecisionPublisher},
    runner::{OnlineRunner, ScoredMessage, ShardedScorer},
    types::{ErrorResponse, HealthResponse, ScoringResponse},
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!(
            "fraud_monitoring={level},fraud_alerts={level}",
            level = logging.level
        )),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

async fn build_channels(
    config: &AppConfig,
    client: &async_nats::Client,
) -> Result<Vec<AlertChannel>> {
    let mut channels = Vec::with_capacity(config.alerts.channels.len());
    for kind in &config.alerts.channels {
        let channel = match kind {
            AlertChannelKind::Log => AlertChannel::Log,
            AlertChannelKind::File => {
                let file = FileAlertChannel::open(&config.alerts.file_path).await?;
                info!(path = %file.path().display(), "File alert channel enabled");
                AlertChannel::File(file)
            }
            AlertChannelKind::Nats => {
                let producer = AlertProducer::new(client.clone(), &config.nats.alert_subject);
                info!(subject = producer.subject(), "NATS alert channel enabled");
                AlertChannel::Nats(producer)
            }
        };
        channels.push(channel);
    }
    Ok(channels)
}

/// Publish every scored message back to NATS, in completion order
async fn publish_results(
    mut results: mpsc::Receiver<ScoredMessage<Option<async_nats::Subject>>>,
    publisher: DecisionPublisher,
    metrics: Arc<PipelineMetrics>,
) {
    let mut processed: u64 = 0;

    while let Some(scored) = results.recv().await {
        let reply = scored.context;
        let published = match &scored.result {
            Ok(outcome) => {
                let response: ScoringResponse = outcome.response();
                if let Some(warning) = &outcome.decision.alert_warning {
                    warn!(
                        transaction_id = %outcome.transaction_id,
                        error = %warning,
                        "Alert not queued"
                    );
                }
                debug!(
                    transaction_id = %outcome.transaction_id,
                    decision = outcome.decision.scored.decision.code(),
                    fraud_probability = response.fraud_probability,
                    "Decision ready"
                );
                publisher.publish(&response, reply).await
            }
            Err(e) => {
                warn!(
                    transaction_id = scored.transaction_id.as_deref().unwrap_or("-"),
                    kind = e.kind(),
                    error = %e,
                    "Transaction not scored"
                );
                let response = ErrorResponse::from_error(e, scored.transaction_id.as_deref());
                publisher.publish(&response, reply).await
            }
        };

        if let Err(e) = published {
            error!(error = %e, "Failed to publish scoring response");
        }

        processed += 1;
        if processed % 100 == 0 {
            let processing_stats = metrics.get_processing_stats();
            info!(
                processed,
                throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                avg_latency_us = processing_stats.mean_us,
                "Processing milestone"
            );
        }
    }
}

/// Answer health requests with the loaded model and feature versions
async fn serve_health(
    client: async_nats::Client,
    subject: String,
    model_version: String,
    encoding_version: String,
    table: Arc<WindowTable>,
    metrics: Arc<PipelineMetrics>,
) -> Result<()> {
    let mut requests = client.subscribe(subject.clone()).await?;
    info!(subject = %subject, "Health subject ready");

    while let Some(request) = requests.next().await {
        let Some(reply) = request.reply else {
            continue;
        };
        let health = HealthResponse::online(
            &model_version,
            &encoding_version,
            table.user_count(),
            metrics
                .transactions_scored
                .load(std::sync::atomic::Ordering::Relaxed),
            metrics.uptime().as_secs(),
        );
        let payload = serde_json::to_vec(&health)?;
        if let Err(e) = client.publish(reply, payload.into()).await {
            warn!(error = %e, "Failed to answer health request");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| fraud_monitoring::config::DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;
    init_tracing(&config.logging)?;

    info!("Starting Fraud Monitoring service");
    let thresholds = config.detection.thresholds();
    info!(
        flag_threshold = thresholds.flag_threshold,
        reject_threshold = thresholds.reject_threshold,
        "Configuration loaded from {}",
        config_path
    );

    // Artifact problems are fatal: no scoring with a mismatched layout
    let artifact = ModelArtifact::load(&config.model.artifact_dir)?;
    let classifier = Arc::new(OnnxClassifier::from_artifact(
        &artifact,
        config.model.onnx_threads,
    )?);
    let model_version = classifier.model_version().to_string();
    let encoding_version = artifact.encoding.version().to_string();
    info!(
        model_version = %model_version,
        categories = artifact.encoding.len(),
        "Classifier ready"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    // Alerts leave the scoring path through a bounded queue
    let (sink, alert_rx) = alert_queue(config.alerts.queue_capacity, metrics.clone());
    let channels = build_channels(&config, &client).await?;
    let dispatcher = AlertDispatcher::new(alert_rx, channels, metrics.clone());
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    let table = Arc::new(WindowTable::new());
    let engine = DecisionEngine::new(thresholds, Arc::new(sink));
    let runner = Arc::new(
        OnlineRunner::new(
            Arc::new(artifact.encoding),
            classifier,
            engine,
            Duration::from_millis(config.pipeline.timeout_ms),
            metrics.clone(),
        )
        .with_table(table.clone()),
    );

    if config.window.idle_eviction_secs > 0 {
        let idle_for = chrono::Duration::seconds(config.window.idle_eviction_secs as i64);
        let sweep_every = Duration::from_secs(config.window.sweep_interval_secs.max(1));
        let table = table.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            loop {
                ticker.tick().await;
                let evicted = table.evict_idle(chrono::Utc::now(), idle_for);
                if evicted > 0 {
                    info!(evicted, users = table.user_count(), "Idle user states reclaimed");
                }
            }
        });
        info!(
            idle_eviction_secs = config.window.idle_eviction_secs,
            "Idle user eviction enabled"
        );
    }

    let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
    tokio::spawn(reporter.start());

    tokio::spawn({
        let health = serve_health(
            client.clone(),
            config.nats.health_subject.clone(),
            model_version,
            encoding_version,
            table.clone(),
            metrics.clone(),
        );
        async move {
            if let Err(e) = health.await {
                error!(error = %e, "Health subject stopped");
            }
        }
    });

    let consumer = TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let publisher = DecisionPublisher::new(client.clone(), &config.nats.decision_subject);

    // One ordered queue per shard keeps each user's transactions in arrival order
    let num_workers = config.pipeline.workers;
    let (results_tx, results_rx) = mpsc::channel(config.pipeline.shard_queue * num_workers);
    let (scorer, shard_handles) = ShardedScorer::spawn(
        runner,
        num_workers,
        config.pipeline.shard_queue,
        results_tx,
    );
    let publisher_handle = tokio::spawn(publish_results(results_rx, publisher.clone(), metrics.clone()));

    info!(
        shards = scorer.shard_count(),
        transactions = consumer.subject(),
        decisions = publisher.subject(),
        "Starting transaction scoring loop"
    );

    let mut subscription = consumer.subscribe().await?;

    loop {
        let message = tokio::select! {
            next = subscription.next() => match next {
                Some(message) => message,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let transaction = decode_transaction(&message.payload);
        if let Err(e) = &transaction {
            metrics.record_error(e.kind());
        }
        scorer.submit(message.reply, transaction).await?;
    }

    info!("Service shutting down...");
    // Closing the shard queues lets each shard drain, then drops the runner and
    // with it the alert queue sender
    drop(scorer);
    for handle in shard_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Scoring shard panicked");
        }
    }
    let _ = publisher_handle.await;
    if tokio::time::timeout(Duration::from_secs(5), dispatcher_handle)
        .await
        .is_err()
    {
        warn!("Alert dispatcher did not drain in time");
    }
    metrics.print_summary();

    Ok(())
}
