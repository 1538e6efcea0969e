//! Framepipe - durable at-least-once frame conversion pipeline.
//!
//! The service consumes frame descriptors from a Kafka topic, retrieves the
//! referenced blob from object storage, converts it, stores the result and
//! republishes metadata about the converted blob downstream. Offsets are
//! committed only after the downstream write succeeds, so a crash can cause
//! a duplicate conversion but never a lost frame.
//!
//! # Example
//!
//! ```rust,no_run
//! use framepipe::backoff::ExponentialBackoff;
//! use framepipe::identity::IdentityPool;
//! use framepipe::metrics::MetricsReporter;
//! use framepipe::pipeline::PipelineEngine;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(
//! #     reader: Box<dyn framepipe::stream::Reader>,
//! #     writer: Box<dyn framepipe::stream::Writer>,
//! #     processor: Box<dyn framepipe::processor::FrameProcessing>,
//! # ) -> anyhow::Result<()> {
//! let identities = IdentityPool::spawn(16);
//! let engine = PipelineEngine::builder()
//!     .reader(reader)
//!     .writer(writer)
//!     .processor(processor)
//!     .backoff(Box::new(ExponentialBackoff::new(Duration::from_millis(100))))
//!     .reporter(Box::new(MetricsReporter::new("framepipe")))
//!     .build(&identities)
//!     .await?;
//!
//! engine.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod converter;
pub mod frame;
pub mod identity;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod storage;
pub mod stream;

// Re-export main types
pub use backoff::{Backoff, ExponentialBackoff};
pub use config::Config;
pub use converter::{ConvertError, Converter, PassthroughConverter};
pub use frame::{CodecError, ConvertedResult, FrameDescriptor, Location, LocationKind};
pub use identity::IdentityPool;
pub use metrics::{MetricsReporter, Reporter};
pub use pipeline::{DroppedFrameHandler, PipelineBuilder, PipelineEngine, PipelineError};
pub use processor::{FrameProcessing, FrameProcessor, ProcessorError};
pub use storage::{ObjectStore, S3ObjectStore, StorageError};
pub use stream::{
    FetchedMessage, KafkaReader, KafkaWriter, MessagePosition, OutboundMessage, Reader,
    StreamError, Writer,
};
