//! Service configuration, layered from optional files and the environment.

use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the frame pipeline service.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service-level settings
    #[serde(default)]
    pub service: ServiceConfig,
    /// Kafka stream settings
    #[serde(default)]
    pub stream: StreamConfig,
    /// Object storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Frame processor settings
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// Retry backoff settings
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Upper bound on pipeline instances started in this process
    #[serde(default = "default_max_pipelines")]
    pub max_pipelines: usize,
}

/// Kafka stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Kafka bootstrap servers
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// Consumer group ID
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Topic carrying inbound frame descriptors
    #[serde(default = "default_input_topic")]
    pub input_topic: String,
    /// Topic carrying outbound converted results
    #[serde(default = "default_output_topic")]
    pub output_topic: String,
    /// Auto offset reset policy
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,
    /// Producer delivery timeout in milliseconds
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    /// SASL username
    pub sasl_username: Option<String>,
    /// SASL password
    pub sasl_password: Option<String>,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Create the destination bucket before the first store if it is missing
    #[serde(default)]
    pub create_bucket_if_missing: bool,
}

/// Frame processor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Bucket converted blobs are stored in
    #[serde(default = "default_destination_bucket")]
    pub destination_bucket: String,
    /// Converter kind to run frames through
    #[serde(default = "default_converter_kind")]
    pub converter_kind: String,
}

/// Retry backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    /// Initial retry delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Optional ceiling on the exponentially growing delay, in milliseconds
    pub max_delay_ms: Option<u64>,
}

// Default value functions
fn default_service_name() -> String {
    "framepipe".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_max_pipelines() -> usize {
    10000
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_consumer_group() -> String {
    "framepipe".to_string()
}

fn default_input_topic() -> String {
    "frames.incoming".to_string()
}

fn default_output_topic() -> String {
    "frames.converted".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_session_timeout_ms() -> u32 {
    30000
}

fn default_delivery_timeout_ms() -> u64 {
    30000
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_destination_bucket() -> String {
    "converted-frames".to_string()
}

fn default_converter_kind() -> String {
    "passthrough".to_string()
}

fn default_initial_delay_ms() -> u64 {
    100
}

impl Config {
    /// Load configuration from config files and environment variables.
    /// Environment variables use the `FRAMEPIPE` prefix, e.g.
    /// `FRAMEPIPE_STREAM__BOOTSTRAP_SERVERS` maps to
    /// `stream.bootstrap_servers`.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/framepipe").required(false))
            .add_source(config::File::with_name("/etc/framepipe/framepipe").required(false))
            .add_source(
                config::Environment::with_prefix("FRAMEPIPE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl StreamConfig {
    /// Producer delivery timeout as a Duration.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl BackoffConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay_ms.map(Duration::from_millis)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
            max_pipelines: default_max_pipelines(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            consumer_group: default_consumer_group(),
            input_topic: default_input_topic(),
            output_topic: default_output_topic(),
            auto_offset_reset: default_auto_offset_reset(),
            session_timeout_ms: default_session_timeout_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            sasl_username: None,
            sasl_password: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: None,
            force_path_style: false,
            create_bucket_if_missing: false,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            destination_bucket: default_destination_bucket(),
            converter_kind: default_converter_kind(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: None,
        }
    }
}
