//! Frame processor: retrieve, convert, store, describe.
//!
//! The processor is stateless besides its injected dependencies and owns no
//! retry policy; any failure fails this call only and the engine decides
//! what to do with the frame.

use crate::converter::{ConvertError, Converter};
use crate::frame::{ConvertedResult, FrameDescriptor, Location, LocationKind};
use crate::storage::{ObjectStore, StorageError};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument};

const CONTENT_TYPE_BLOB: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("No converter provided")]
    MissingConverter,

    #[error("No object store provided")]
    MissingStore,

    #[error("Failed to retrieve frame {frame_id}: {source}")]
    Retrieve {
        frame_id: String,
        source: StorageError,
    },

    #[error("Failed to convert frame {frame_id}: {source}")]
    Convert {
        frame_id: String,
        source: ConvertError,
    },

    #[error("Failed to store converted frame {frame_id}: {source}")]
    Store {
        frame_id: String,
        source: StorageError,
    },
}

/// Frame processing capability, as seen by the pipeline engine.
#[async_trait]
pub trait FrameProcessing: Send + Sync {
    /// The processing kind label, used for logs and metrics.
    fn kind(&self) -> &str;

    async fn process(&self, frame: &FrameDescriptor) -> Result<ConvertedResult, ProcessorError>;
}

/// Destination object name for a frame. Deterministic in the frame id, so
/// reprocessing after a crash overwrites the same object instead of
/// creating a duplicate.
fn converted_object_name(frame_id: &str) -> String {
    format!("converted_{frame_id}.blob")
}

/// Retrieves a frame blob, converts it and stores the result in the
/// destination bucket.
pub struct FrameProcessor {
    destination_bucket: String,
    converter: Box<dyn Converter>,
    store: Box<dyn ObjectStore>,
}

impl FrameProcessor {
    pub fn builder() -> FrameProcessorBuilder {
        FrameProcessorBuilder::default()
    }
}

#[derive(Default)]
pub struct FrameProcessorBuilder {
    destination_bucket: String,
    converter: Option<Box<dyn Converter>>,
    store: Option<Box<dyn ObjectStore>>,
}

impl FrameProcessorBuilder {
    pub fn destination_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.destination_bucket = bucket.into();
        self
    }

    pub fn converter(mut self, converter: Box<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn object_store(mut self, store: Box<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<FrameProcessor, ProcessorError> {
        let converter = self.converter.ok_or(ProcessorError::MissingConverter)?;
        let store = self.store.ok_or(ProcessorError::MissingStore)?;

        Ok(FrameProcessor {
            destination_bucket: self.destination_bucket,
            converter,
            store,
        })
    }
}

#[async_trait]
impl FrameProcessing for FrameProcessor {
    fn kind(&self) -> &str {
        self.converter.kind()
    }

    #[instrument(skip(self, frame), fields(frame_id = %frame.frame_id))]
    async fn process(&self, frame: &FrameDescriptor) -> Result<ConvertedResult, ProcessorError> {
        debug!(
            bucket = %frame.frame_location.bucket,
            object_name = %frame.frame_location.object_name,
            "Processing frame"
        );

        let raw = self
            .store
            .retrieve(
                &frame.frame_location.bucket,
                &frame.frame_location.object_name,
            )
            .await
            .map_err(|source| ProcessorError::Retrieve {
                frame_id: frame.frame_id.clone(),
                source,
            })?;

        let converted = self
            .converter
            .convert(&raw)
            .await
            .map_err(|source| ProcessorError::Convert {
                frame_id: frame.frame_id.clone(),
                source,
            })?;

        let object_name = converted_object_name(&frame.frame_id);
        self.store
            .store(
                &self.destination_bucket,
                &object_name,
                &converted,
                CONTENT_TYPE_BLOB,
            )
            .await
            .map_err(|source| ProcessorError::Store {
                frame_id: frame.frame_id.clone(),
                source,
            })?;

        info!(
            bucket = %self.destination_bucket,
            object_name = %object_name,
            "Frame converted and stored"
        );

        Ok(ConvertedResult {
            frame_id: frame.frame_id.clone(),
            frame_location: frame.frame_location.clone(),
            converted_location: Location {
                kind: LocationKind::ObjectStore,
                bucket: self.destination_bucket.clone(),
                object_name,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        objects: Mutex<HashMap<(String, String), Vec<u8>>>,
        content_types: Mutex<Vec<String>>,
        fail_retrieve: bool,
        fail_store: bool,
    }

    impl MockStore {
        fn with_object(bucket: &str, object: &str, bytes: &[u8]) -> Self {
            let store = Self::default();
            store
                .objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), object.to_string()), bytes.to_vec());
            store
        }

        fn stored(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), object.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl ObjectStore for std::sync::Arc<MockStore> {
        async fn retrieve(
            &self,
            bucket: &str,
            object_name: &str,
        ) -> Result<Vec<u8>, StorageError> {
            if self.fail_retrieve {
                return Err(StorageError::Retrieve {
                    bucket: bucket.to_string(),
                    object: object_name.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            self.stored(bucket, object_name)
                .ok_or_else(|| StorageError::Retrieve {
                    bucket: bucket.to_string(),
                    object: object_name.to_string(),
                    message: "no such object".to_string(),
                })
        }

        async fn store(
            &self,
            bucket: &str,
            object_name: &str,
            bytes: &[u8],
            content_type: &str,
        ) -> Result<(), StorageError> {
            if self.fail_store {
                return Err(StorageError::Store {
                    bucket: bucket.to_string(),
                    object: object_name.to_string(),
                    message: "access denied".to_string(),
                });
            }
            self.content_types
                .lock()
                .unwrap()
                .push(content_type.to_string());
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), object_name.to_string()), bytes.to_vec());
            Ok(())
        }
    }

    struct UppercaseConverter;

    #[async_trait]
    impl Converter for UppercaseConverter {
        fn kind(&self) -> &str {
            "uppercase"
        }

        async fn convert(&self, from: &[u8]) -> Result<Vec<u8>, ConvertError> {
            Ok(from.to_ascii_uppercase())
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl Converter for FailingConverter {
        fn kind(&self) -> &str {
            "failing"
        }

        async fn convert(&self, _from: &[u8]) -> Result<Vec<u8>, ConvertError> {
            Err(ConvertError("corrupt frame".to_string()))
        }
    }

    fn test_frame() -> FrameDescriptor {
        FrameDescriptor {
            frame_id: "frame_1".to_string(),
            frame_location: Location {
                kind: LocationKind::ObjectStore,
                bucket: "incoming".to_string(),
                object_name: "frame_1.raw".to_string(),
            },
        }
    }

    fn processor_with(
        store: std::sync::Arc<MockStore>,
        converter: Box<dyn Converter>,
    ) -> FrameProcessor {
        FrameProcessor::builder()
            .destination_bucket("converted")
            .converter(converter)
            .object_store(Box::new(store))
            .build()
            .unwrap()
    }

    #[test]
    fn build_fails_without_converter() {
        let store = std::sync::Arc::new(MockStore::default());
        let err = FrameProcessor::builder()
            .destination_bucket("converted")
            .object_store(Box::new(store))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ProcessorError::MissingConverter));
    }

    #[test]
    fn build_fails_without_object_store() {
        let err = FrameProcessor::builder()
            .destination_bucket("converted")
            .converter(Box::new(UppercaseConverter))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ProcessorError::MissingStore));
    }

    #[tokio::test]
    async fn converts_and_stores_frame() {
        let store = std::sync::Arc::new(MockStore::with_object(
            "incoming",
            "frame_1.raw",
            b"frame bytes",
        ));
        let processor = processor_with(store.clone(), Box::new(UppercaseConverter));

        let result = processor.process(&test_frame()).await.unwrap();

        assert_eq!(
            store.stored("converted", "converted_frame_1.blob").unwrap(),
            b"FRAME BYTES"
        );
        assert_eq!(
            store.content_types.lock().unwrap().as_slice(),
            ["application/octet-stream"]
        );
        assert_eq!(result.converted_location.bucket, "converted");
        assert_eq!(
            result.converted_location.object_name,
            "converted_frame_1.blob"
        );
        assert_eq!(result.converted_location.kind, LocationKind::ObjectStore);
    }

    #[tokio::test]
    async fn preserves_frame_provenance() {
        let store = std::sync::Arc::new(MockStore::with_object(
            "incoming",
            "frame_1.raw",
            b"frame bytes",
        ));
        let processor = processor_with(store, Box::new(UppercaseConverter));

        let frame = test_frame();
        let result = processor.process(&frame).await.unwrap();

        assert_eq!(result.frame_id, frame.frame_id);
        assert_eq!(result.frame_location, frame.frame_location);
    }

    #[tokio::test]
    async fn destination_name_is_deterministic() {
        let store = std::sync::Arc::new(MockStore::with_object(
            "incoming",
            "frame_1.raw",
            b"frame bytes",
        ));
        let processor = processor_with(store, Box::new(UppercaseConverter));

        let first = processor.process(&test_frame()).await.unwrap();
        let second = processor.process(&test_frame()).await.unwrap();

        assert_eq!(
            first.converted_location.object_name,
            second.converted_location.object_name
        );
    }

    #[tokio::test]
    async fn retrieve_failure_propagates() {
        let store = std::sync::Arc::new(MockStore {
            fail_retrieve: true,
            ..MockStore::default()
        });
        let processor = processor_with(store, Box::new(UppercaseConverter));

        let err = processor.process(&test_frame()).await.err().unwrap();
        assert!(matches!(err, ProcessorError::Retrieve { .. }));
    }

    #[tokio::test]
    async fn convert_failure_propagates() {
        let store = std::sync::Arc::new(MockStore::with_object(
            "incoming",
            "frame_1.raw",
            b"frame bytes",
        ));
        let processor = processor_with(store, Box::new(FailingConverter));

        let err = processor.process(&test_frame()).await.err().unwrap();
        assert!(matches!(err, ProcessorError::Convert { .. }));
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = std::sync::Arc::new(MockStore {
            fail_store: true,
            ..MockStore::default()
        });
        store.objects.lock().unwrap().insert(
            ("incoming".to_string(), "frame_1.raw".to_string()),
            b"frame bytes".to_vec(),
        );
        let processor = processor_with(store, Box::new(UppercaseConverter));

        let err = processor.process(&test_frame()).await.err().unwrap();
        assert!(matches!(err, ProcessorError::Store { .. }));
    }

    #[test]
    fn processor_kind_follows_converter() {
        let store = std::sync::Arc::new(MockStore::default());
        let processor = processor_with(store, Box::new(UppercaseConverter));
        assert_eq!(processor.kind(), "uppercase");
    }
}
