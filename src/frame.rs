//! Wire data model for the conversion pipeline.
//!
//! A [`FrameDescriptor`] arrives on the inbound topic and points at the blob
//! to convert; a [`ConvertedResult`] is published downstream once the
//! converted blob has been stored. Both are carried as JSON payloads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the payload codec. These are deliberately distinct from
/// transport errors: an undecodable payload is dropped, never retried.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to decode frame descriptor: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode converted result: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The kind of store a [`Location`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    #[default]
    Unspecified,
    ObjectStore,
}

/// Address of a blob: bucket plus object name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub kind: LocationKind,
    pub bucket: String,
    pub object_name: String,
}

/// One unit of work: a frame identifier and the location of its source blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub frame_id: String,
    pub frame_location: Location,
}

impl FrameDescriptor {
    /// Decode a descriptor from an inbound message payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}

/// Outcome of converting one frame. `frame_id` and `frame_location` are
/// copied verbatim from the originating descriptor; only
/// `converted_location` is assigned by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedResult {
    pub frame_id: String,
    pub frame_location: Location,
    pub converted_location: Location,
}

impl ConvertedResult {
    /// Encode the result for the outbound message payload.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_frame_descriptor() {
        let json = r#"{
            "frame_id": "frame_42",
            "frame_location": {
                "kind": "object_store",
                "bucket": "incoming",
                "object_name": "frame_42.raw"
            }
        }"#;

        let frame = FrameDescriptor::decode(json.as_bytes()).unwrap();
        assert_eq!(frame.frame_id, "frame_42");
        assert_eq!(frame.frame_location.kind, LocationKind::ObjectStore);
        assert_eq!(frame.frame_location.bucket, "incoming");
        assert_eq!(frame.frame_location.object_name, "frame_42.raw");
    }

    #[test]
    fn location_kind_defaults_to_unspecified() {
        let json = r#"{
            "frame_id": "frame_1",
            "frame_location": { "bucket": "b", "object_name": "o" }
        }"#;

        let frame = FrameDescriptor::decode(json.as_bytes()).unwrap();
        assert_eq!(frame.frame_location.kind, LocationKind::Unspecified);
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = FrameDescriptor::decode(b"not json at all").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn encoded_result_round_trips() {
        let result = ConvertedResult {
            frame_id: "frame_7".to_string(),
            frame_location: Location {
                kind: LocationKind::ObjectStore,
                bucket: "incoming".to_string(),
                object_name: "frame_7.raw".to_string(),
            },
            converted_location: Location {
                kind: LocationKind::ObjectStore,
                bucket: "converted".to_string(),
                object_name: "converted_frame_7.blob".to_string(),
            },
        };

        let bytes = result.encode().unwrap();
        let decoded: ConvertedResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, result);
    }
}
