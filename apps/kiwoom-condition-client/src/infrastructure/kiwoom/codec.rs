//! Frame Codec
//!
//! Decodes gateway text frames into [`InboundFrame`]s and encodes outbound
//! requests to JSON text.
//!
//! Every gateway frame is a single JSON object tagged by `trnm`. The decoded
//! frame keeps the original text so keepalives can be echoed byte-for-byte.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::messages::{MessageKind, correlation_key};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame has no `trnm` tag.
    #[error("frame has no message type tag")]
    MissingType,

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// A decoded inbound frame. Transient: classified once, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Message type.
    pub kind: MessageKind,
    /// Decoded JSON object.
    pub body: Map<String, Value>,
    /// Original frame text.
    pub text: String,
}

impl InboundFrame {
    /// Correlation key (`seq`) carried by the frame, if any.
    #[must_use]
    pub fn correlation_key(&self) -> Option<String> {
        correlation_key(&self.body)
    }

    /// Deserialize the frame body into a typed message.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(serde_json::from_value(Value::Object(self.body.clone()))?)
    }

    /// Raw `return_code` value, for logging.
    #[must_use]
    pub fn return_code(&self) -> Option<&Value> {
        self.body.get("return_code")
    }
}

/// JSON codec for the condition-search protocol.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object or has no `trnm`.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                trimmed.chars().take(50).collect::<String>()
            )));
        }

        let Value::Object(body) = serde_json::from_str::<Value>(trimmed)? else {
            return Err(CodecError::InvalidFormat("expected JSON object".to_string()));
        };

        let kind = body
            .get("trnm")
            .and_then(Value::as_str)
            .map(MessageKind::from_trnm)
            .ok_or(CodecError::MissingType)?;

        Ok(InboundFrame {
            kind,
            body,
            text: text.to_string(),
        })
    }

    /// Encode a value to JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}
