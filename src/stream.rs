//! Kafka access for the pipeline.
//!
//! The engine only sees the [`Reader`] and [`Writer`] capability traits;
//! the Kafka implementations here keep offset commits manual and decoupled
//! from fetches, so a fetched message stays uncommitted until the engine
//! has written its result downstream.

use crate::config::StreamConfig;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to create Kafka client: {0}")]
    Creation(String),

    #[error("Failed to subscribe to topic {topic}: {message}")]
    Subscription { topic: String, message: String },

    #[error("Failed to fetch message: {0}")]
    Fetch(String),

    #[error("Failed to commit message: {0}")]
    Commit(String),

    #[error("Failed to write message: {0}")]
    Write(String),
}

/// Durable position of a fetched message. Opaque to the engine; it is
/// passed back unmodified when the message is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message fetched from the inbound topic, together with the position
/// required to commit it.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub position: MessagePosition,
}

/// An outbound message, keyed for partitioned delivery.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Transactional message reader with manual offset commit.
///
/// `fetch` must not advance the durable consumer-group offset; only
/// `commit` does.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn fetch(&self) -> Result<FetchedMessage, StreamError>;

    async fn commit(&self, message: &FetchedMessage) -> Result<(), StreamError>;
}

/// Atomic message writer with at-least-once delivery.
#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, message: OutboundMessage) -> Result<(), StreamError>;
}

fn base_client_config(config: &StreamConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.bootstrap_servers);

    if let (Some(ref username), Some(ref password)) =
        (&config.sasl_username, &config.sasl_password)
    {
        client_config
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    client_config
}

/// Kafka reader over a consumer group with auto-commit disabled.
pub struct KafkaReader {
    consumer: StreamConsumer,
}

impl KafkaReader {
    pub fn new(config: &StreamConfig) -> Result<Self, StreamError> {
        let mut client_config = base_client_config(config);
        client_config
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string());

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| StreamError::Creation(e.to_string()))?;

        consumer
            .subscribe(&[config.input_topic.as_str()])
            .map_err(|e| StreamError::Subscription {
                topic: config.input_topic.clone(),
                message: e.to_string(),
            })?;

        info!(
            topic = %config.input_topic,
            group = %config.consumer_group,
            "Subscribed to inbound topic"
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl Reader for KafkaReader {
    async fn fetch(&self) -> Result<FetchedMessage, StreamError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| StreamError::Fetch(e.to_string()))?;

        debug!(
            partition = message.partition(),
            offset = message.offset(),
            "Fetched message"
        );

        Ok(FetchedMessage {
            key: message.key().map(<[u8]>::to_vec),
            // An absent payload is surfaced as an empty one and dropped by
            // the engine as undecodable, not treated as a transport failure.
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            position: MessagePosition {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            },
        })
    }

    async fn commit(&self, message: &FetchedMessage) -> Result<(), StreamError> {
        let position = &message.position;

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(
                &position.topic,
                position.partition,
                Offset::Offset(position.offset + 1),
            )
            .map_err(|e| StreamError::Commit(e.to_string()))?;

        self.consumer
            .commit(&assignment, CommitMode::Sync)
            .map_err(|e| StreamError::Commit(e.to_string()))?;

        debug!(
            partition = position.partition,
            offset = position.offset,
            "Committed message"
        );
        Ok(())
    }
}

/// Kafka writer that waits for broker acknowledgment of every message.
pub struct KafkaWriter {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaWriter {
    pub fn new(config: &StreamConfig) -> Result<Self, StreamError> {
        let mut client_config = base_client_config(config);
        client_config.set("acks", "all");

        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| StreamError::Creation(e.to_string()))?;

        info!(topic = %config.output_topic, "Kafka writer created");

        Ok(Self {
            producer,
            topic: config.output_topic.clone(),
            delivery_timeout: config.delivery_timeout(),
        })
    }
}

#[async_trait]
impl Writer for KafkaWriter {
    async fn write(&self, message: OutboundMessage) -> Result<(), StreamError> {
        let record = FutureRecord::to(&self.topic)
            .key(&message.key)
            .payload(&message.payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
            .map_err(|(e, _)| StreamError::Write(e.to_string()))?;

        debug!(
            topic = %self.topic,
            partition,
            offset,
            key = %message.key,
            "Wrote message"
        );
        Ok(())
    }
}
