//! The end-to-end processing pipeline.
//!
//! [`PipelineEngine::run`] pulls one message at a time from the reader,
//! decodes it into a frame descriptor, hands it to the processor, writes the
//! encoded result downstream and only then commits the original message.
//! That write-before-commit ordering is what makes the pipeline at-least-once:
//! a crash between write and commit causes a redelivery and a duplicate,
//! idempotently named, downstream write instead of a lost frame.
//!
//! Fetch, write and commit share one bounded-retry policy with exponential
//! backoff; decode, process and encode failures drop the frame without
//! committing it, leaving redelivery to the consumer group.

use crate::backoff::Backoff;
use crate::frame::FrameDescriptor;
use crate::identity::IdentityPool;
use crate::metrics::Reporter;
use crate::processor::FrameProcessing;
use crate::stream::{FetchedMessage, OutboundMessage, Reader, StreamError, Writer};
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Retry budget for each of the fetch, write and commit stages. Budgets are
/// per stage per entry, never shared across stages.
const RETRY_BUDGET: u32 = 3;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No reader provided")]
    MissingReader,

    #[error("No writer provided")]
    MissingWriter,

    #[error("No processor provided")]
    MissingProcessor,

    #[error("No backoff strategy provided")]
    MissingBackoff,

    #[error("No metrics reporter provided")]
    MissingReporter,

    #[error("Pipeline identity pool is exhausted")]
    IdentitiesExhausted,

    #[error("Giving up fetching after {attempts} attempts: {source}")]
    FetchExhausted { attempts: u32, source: StreamError },

    #[error("Giving up writing after {attempts} attempts: {source}")]
    WriteExhausted { attempts: u32, source: StreamError },

    #[error("Giving up committing after {attempts} attempts: {source}")]
    CommitExhausted { attempts: u32, source: StreamError },
}

/// Observer for frames abandoned by the drop-and-continue policy.
///
/// Dropped frames are never committed, so the consumer group will redeliver
/// them eventually; a dead-letter route can be attached here without
/// changing the engine's semantics.
pub trait DroppedFrameHandler: Send + Sync {
    fn frame_dropped(&self, message: &FetchedMessage, stage: &str);
}

/// Run `op` until it succeeds or the retry budget is spent, sleeping on the
/// shared backoff between attempts. Every failed attempt is counted against
/// the stage's failure metric; the final error is returned with the number
/// of attempts made.
async fn run_with_retry<T, F, Fut>(
    stage: &str,
    budget: u32,
    backoff: &mut dyn Backoff,
    reporter: &dyn Reporter,
    mut op: F,
) -> Result<T, (u32, StreamError)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StreamError>>,
{
    let mut attempts = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempts += 1;
                reporter.pipeline_failed(stage);

                if attempts >= budget {
                    return Err((attempts, err));
                }

                warn!(
                    stage,
                    attempt = attempts,
                    error = %err,
                    "Stage failed, backing off before retry"
                );
                backoff.sleep().await;
            }
        }
    }
}

fn duration_millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// A frame processing pipeline instance. Single-threaded: all stage
/// transitions are strictly sequential within one engine; run several
/// engines for parallelism.
pub struct PipelineEngine {
    id: String,
    reader: Box<dyn Reader>,
    writer: Box<dyn Writer>,
    processor: Box<dyn FrameProcessing>,
    backoff: Box<dyn Backoff>,
    reporter: Box<dyn Reporter>,
    drop_handler: Option<Box<dyn DroppedFrameHandler>>,
}

impl PipelineEngine {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// The identity label of this instance, for log correlation.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run the pipeline until cancellation or retry exhaustion.
    ///
    /// Cancellation is cooperative and observed only at the top of the
    /// loop, so an in-flight cycle always completes (or fails fatally)
    /// before the engine stops. Returns `Ok(())` on graceful stop and the
    /// terminal stage error once a retry budget is exhausted.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let PipelineEngine {
            id,
            reader,
            writer,
            processor,
            mut backoff,
            reporter,
            drop_handler,
        } = self;

        info!(pipeline_id = %id, "Starting pipeline");

        loop {
            if cancel.is_cancelled() {
                info!(pipeline_id = %id, "Pipeline stopped");
                return Ok(());
            }

            debug!(pipeline_id = %id, "Fetching next message");
            let message = match run_with_retry(
                "fetch",
                RETRY_BUDGET,
                backoff.as_mut(),
                reporter.as_ref(),
                || reader.fetch(),
            )
            .await
            {
                Ok(message) => message,
                Err((attempts, source)) => {
                    error!(
                        pipeline_id = %id,
                        attempts,
                        error = %source,
                        "Stopping pipeline after consecutive failed fetches"
                    );
                    return Err(PipelineError::FetchExhausted { attempts, source });
                }
            };
            let cycle_started = Instant::now();

            let frame = match FrameDescriptor::decode(&message.payload) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(
                        pipeline_id = %id,
                        error = %err,
                        "Dropping message with undecodable payload"
                    );
                    reporter.pipeline_failed("decode");
                    if let Some(ref handler) = drop_handler {
                        handler.frame_dropped(&message, "decode");
                    }
                    continue;
                }
            };

            let process_started = Instant::now();
            let result = match processor.process(&frame).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(
                        pipeline_id = %id,
                        frame_id = %frame.frame_id,
                        error = %err,
                        "Dropping frame after processing failure"
                    );
                    reporter.pipeline_failed("process");
                    if let Some(ref handler) = drop_handler {
                        handler.frame_dropped(&message, "process");
                    }
                    continue;
                }
            };
            reporter
                .conversion_finished(processor.kind(), duration_millis(process_started.elapsed()));

            let payload = match result.encode() {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(
                        pipeline_id = %id,
                        frame_id = %result.frame_id,
                        error = %err,
                        "Dropping frame with unencodable result"
                    );
                    reporter.pipeline_failed("encode");
                    if let Some(ref handler) = drop_handler {
                        handler.frame_dropped(&message, "encode");
                    }
                    continue;
                }
            };

            let outbound = OutboundMessage {
                key: result.frame_id.clone(),
                payload,
            };
            if let Err((attempts, source)) = run_with_retry(
                "write",
                RETRY_BUDGET,
                backoff.as_mut(),
                reporter.as_ref(),
                || writer.write(outbound.clone()),
            )
            .await
            {
                error!(
                    pipeline_id = %id,
                    frame_id = %result.frame_id,
                    attempts,
                    error = %source,
                    "Stopping pipeline after consecutive failed writes"
                );
                return Err(PipelineError::WriteExhausted { attempts, source });
            }

            if let Err((attempts, source)) = run_with_retry(
                "commit",
                RETRY_BUDGET,
                backoff.as_mut(),
                reporter.as_ref(),
                || reader.commit(&message),
            )
            .await
            {
                error!(
                    pipeline_id = %id,
                    frame_id = %result.frame_id,
                    attempts,
                    error = %source,
                    "Stopping pipeline after consecutive failed commits"
                );
                return Err(PipelineError::CommitExhausted { attempts, source });
            }

            backoff.reset();
            reporter.frame_processed(processor.kind(), duration_millis(cycle_started.elapsed()));
            debug!(pipeline_id = %id, frame_id = %result.frame_id, "Cycle completed");
        }
    }
}

/// Builder for [`PipelineEngine`]. Every dependency except the dropped-frame
/// handler is required; building without one fails with the corresponding
/// configuration error before any identity is consumed.
#[derive(Default)]
pub struct PipelineBuilder {
    reader: Option<Box<dyn Reader>>,
    writer: Option<Box<dyn Writer>>,
    processor: Option<Box<dyn FrameProcessing>>,
    backoff: Option<Box<dyn Backoff>>,
    reporter: Option<Box<dyn Reporter>>,
    drop_handler: Option<Box<dyn DroppedFrameHandler>>,
}

impl PipelineBuilder {
    pub fn reader(mut self, reader: Box<dyn Reader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn writer(mut self, writer: Box<dyn Writer>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn processor(mut self, processor: Box<dyn FrameProcessing>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn backoff(mut self, backoff: Box<dyn Backoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn drop_handler(mut self, handler: Box<dyn DroppedFrameHandler>) -> Self {
        self.drop_handler = Some(handler);
        self
    }

    /// Validate the wiring and consume one identity from the pool.
    pub async fn build(self, identities: &IdentityPool) -> Result<PipelineEngine, PipelineError> {
        let reader = self.reader.ok_or(PipelineError::MissingReader)?;
        let writer = self.writer.ok_or(PipelineError::MissingWriter)?;
        let processor = self.processor.ok_or(PipelineError::MissingProcessor)?;
        let backoff = self.backoff.ok_or(PipelineError::MissingBackoff)?;
        let reporter = self.reporter.ok_or(PipelineError::MissingReporter)?;

        let id = identities
            .acquire()
            .await
            .ok_or(PipelineError::IdentitiesExhausted)?;

        Ok(PipelineEngine {
            id,
            reader,
            writer,
            processor,
            backoff,
            reporter,
            drop_handler: self.drop_handler,
        })
    }
}
