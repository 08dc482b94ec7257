use thiserror::Error;

use crate::payload::DecodedPayload;

/// Error types for payload codec operations.
#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("there was an error decoding the payload: {0}")]
    Decode(String),
    #[error("there was an error encoding the payload: {0}")]
    Encode(String),
}

/// The boundary to the external Sparkplug payload codec.
///
/// The session engine consumes and produces payload bytes only through this trait; the
/// binary encoding itself is supplied by the host.
pub trait PayloadCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPayload, CodecError>;
    fn encode(&self, payload: &DecodedPayload) -> Result<Vec<u8>, CodecError>;
}

pub type DynPayloadCodec = dyn PayloadCodec;

/// A [PayloadCodec] that reads and writes payloads as JSON.
///
/// Useful for writing tests where the real binary codec is not available.
#[cfg(any(feature = "json-codec", doc))]
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonPayloadCodec;

#[cfg(any(feature = "json-codec", doc))]
impl JsonPayloadCodec {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(any(feature = "json-codec", doc))]
impl PayloadCodec for JsonPayloadCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPayload, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode(&self, payload: &DecodedPayload) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(|e| CodecError::Encode(e.to_string()))
    }
}
