//! Frame conversion.
//!
//! A converter is a pure byte-to-byte transformation; everything about
//! where the bytes come from and go to belongs to the processor.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Conversion failed: {0}")]
pub struct ConvertError(pub String);

/// Pure byte-to-byte frame transformation.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Label identifying the conversion, used for logs and metrics.
    fn kind(&self) -> &str;

    async fn convert(&self, from: &[u8]) -> Result<Vec<u8>, ConvertError>;
}

/// Converter that returns its input unchanged.
#[derive(Debug, Default)]
pub struct PassthroughConverter;

#[async_trait]
impl Converter for PassthroughConverter {
    fn kind(&self) -> &str {
        "passthrough"
    }

    async fn convert(&self, from: &[u8]) -> Result<Vec<u8>, ConvertError> {
        Ok(from.to_vec())
    }
}

/// Look up a converter by its configured kind.
pub fn for_kind(kind: &str) -> Option<Box<dyn Converter>> {
    match kind {
        "passthrough" => Some(Box::new(PassthroughConverter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_returns_input_unchanged() {
        let converter = PassthroughConverter;
        let out = converter.convert(b"frame bytes").await.unwrap();
        assert_eq!(out, b"frame bytes");
        assert_eq!(converter.kind(), "passthrough");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(for_kind("passthrough").is_some());
        assert!(for_kind("transcode-h264").is_none());
    }
}
