//! Beverage Price Pipeline - Main Entry Point
//!
//! Loads the trained pipeline once, then answers quote requests from NATS
//! with a predicted price bracket.

use anyhow::{Context, Result};
use beverage_price_pipeline::{
    config::{AppConfig, LoggingConfig},
    consumer::RequestConsumer,
    handler::{handle_payload, task_failure},
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ArtifactCache, FsArtifactStore, InferenceService},
    producer::ResponseProducer,
    types::quote::PredictionOutcome,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => AppConfig::load()?,
    };

    init_logging(&config.logging)?;

    info!("Starting Beverage Price Pipeline");
    info!(
        request_subject = %config.nats.request_subject,
        workers = config.pipeline.workers,
        "Configuration loaded successfully"
    );

    // Load artifacts once; without them there is nothing to serve
    let cache = ArtifactCache::new(FsArtifactStore::from_config(&config.artifacts));
    let service = InferenceService::from_cache(&cache).context("Failed to load model artifacts")?;
    let schema = service.artifacts().schema();
    info!(
        numeric_columns = ?schema.numeric_columns(),
        categorical_columns = ?schema.categorical_columns(),
        classes = ?service.artifacts().decoder().classes(),
        "Inference service initialized"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subject);
    let producer = ResponseProducer::new(client.clone(), config.nats.reply_subject.as_deref());

    if config.pipeline.metrics_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
        tokio::spawn(reporter.start());
    }

    let semaphore = Arc::new(Semaphore::new(config.pipeline.workers.max(1)));
    let mut subscription = consumer.subscribe().await?;

    info!(
        "Listening on subject: {} with {} parallel workers",
        consumer.subject(),
        config.pipeline.workers
    );

    while let Some(message) = subscription.next().await {
        // Acquire permit (limits concurrent requests)
        let permit = semaphore.clone().acquire_owned().await?;

        let service = service.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();
            metrics.record_request();

            let payload = message.payload;
            let response =
                match tokio::task::spawn_blocking(move || handle_payload(&service, &payload)).await {
                    Ok(response) => response,
                    Err(e) => {
                        error!(error = %e, "Prediction task failed");
                        task_failure(e)
                    }
                };

            let processing_time = start_time.elapsed();
            match &response.outcome {
                PredictionOutcome::Success { label } => {
                    metrics.record_success(processing_time, label.as_str());
                    debug!(
                        request_id = %response.request_id,
                        label = %label,
                        processing_time_us = processing_time.as_micros(),
                        "Price bracket predicted"
                    );
                }
                PredictionOutcome::Failure { kind, message } => {
                    metrics.record_failure(processing_time, *kind);
                    warn!(
                        request_id = %response.request_id,
                        kind = kind.as_str(),
                        error = %message,
                        "Prediction failed"
                    );
                }
            }

            match producer.respond(message.reply.as_ref(), &response).await {
                Ok(true) => {}
                Ok(false) => warn!(
                    request_id = %response.request_id,
                    "Request had no reply subject; response dropped"
                ),
                Err(e) => error!(
                    request_id = %response.request_id,
                    error = %e,
                    "Failed to publish quote response"
                ),
            }

            drop(permit);
        });
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("beverage_price_pipeline={}", logging.level).parse()?);

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
