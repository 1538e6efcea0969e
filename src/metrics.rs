//! Pipeline metrics.
//!
//! The engine reports through the [`Reporter`] trait and never blocks on it;
//! the production implementation forwards to the process-wide `metrics`
//! recorder, exported over HTTP by the Prometheus exporter installed in
//! `main`.

use anyhow::{Context, Result};
use tracing::info;

/// Fire-and-forget sink for pipeline progress and failure metrics.
pub trait Reporter: Send + Sync {
    /// A frame finished a full fetch-to-commit cycle.
    fn frame_processed(&self, kind: &str, millis: f64);

    /// A single conversion finished.
    fn conversion_finished(&self, kind: &str, millis: f64);

    /// A pipeline stage failed; `failure` names the stage.
    fn pipeline_failed(&self, failure: &str);
}

/// Reporter backed by the `metrics` facade, labelled with the engine name.
pub struct MetricsReporter {
    engine: String,
}

impl MetricsReporter {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
        }
    }
}

impl Reporter for MetricsReporter {
    fn frame_processed(&self, kind: &str, millis: f64) {
        let labels = [
            ("engine", self.engine.clone()),
            ("processing_kind", kind.to_string()),
        ];
        metrics::histogram!("pipeline.frame.duration_ms", &labels).record(millis);
        metrics::counter!("pipeline.frames.total", &labels).increment(1);
    }

    fn conversion_finished(&self, kind: &str, millis: f64) {
        let labels = [
            ("engine", self.engine.clone()),
            ("processing_kind", kind.to_string()),
        ];
        metrics::histogram!("pipeline.conversion.duration_ms", &labels).record(millis);
    }

    fn pipeline_failed(&self, failure: &str) {
        let labels = [
            ("engine", self.engine.clone()),
            ("failure", failure.to_string()),
        ];
        metrics::counter!("pipeline.failures.total", &labels).increment(1);
    }
}

/// Install the process-wide Prometheus metrics exporter.
pub fn install_exporter(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port, "Prometheus metrics exporter started");
    Ok(())
}
