//! Frame pipeline service entry point.

use anyhow::{Context, Result};
use framepipe::backoff::ExponentialBackoff;
use framepipe::config::Config;
use framepipe::converter;
use framepipe::identity::IdentityPool;
use framepipe::metrics::{self, MetricsReporter};
use framepipe::pipeline::PipelineEngine;
use framepipe::processor::FrameProcessor;
use framepipe::storage::S3ObjectStore;
use framepipe::stream::{KafkaReader, KafkaWriter};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "Starting frame pipeline service");

    metrics::install_exporter(config.service.metrics_port)?;

    let store = S3ObjectStore::new(&config.storage).await;

    let converter = converter::for_kind(&config.processor.converter_kind).with_context(|| {
        format!(
            "Unknown converter kind: {}",
            config.processor.converter_kind
        )
    })?;

    let processor = FrameProcessor::builder()
        .destination_bucket(&config.processor.destination_bucket)
        .converter(converter)
        .object_store(Box::new(store))
        .build()
        .context("Failed to build frame processor")?;

    let reader = KafkaReader::new(&config.stream).context("Failed to create Kafka reader")?;
    let writer = KafkaWriter::new(&config.stream).context("Failed to create Kafka writer")?;

    let backoff = match config.backoff.max_delay() {
        Some(max) => ExponentialBackoff::with_max(config.backoff.initial_delay(), max),
        None => ExponentialBackoff::new(config.backoff.initial_delay()),
    };

    let identities = IdentityPool::spawn(config.service.max_pipelines);

    let engine = PipelineEngine::builder()
        .reader(Box::new(reader))
        .writer(Box::new(writer))
        .processor(Box::new(processor))
        .backoff(Box::new(backoff))
        .reporter(Box::new(MetricsReporter::new(&config.service.name)))
        .build(&identities)
        .await
        .context("Failed to build pipeline engine")?;

    info!(pipeline_id = %engine.id(), "Pipeline engine ready");

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        signal_cancel.cancel();
    });

    engine
        .run(cancel)
        .await
        .context("Pipeline stopped with a fatal error")?;

    info!("Frame pipeline service stopped");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
