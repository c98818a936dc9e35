//! Stream Frame Codec
//!
//! Encoding and decoding for the Finnhub trade WebSocket. Inbound frames
//! are single JSON objects discriminated by a `type` field; outbound
//! control messages use the same shape.
//!
//! Decoding never panics: malformed input comes back as a [`CodecError`]
//! and the ingest loop logs it and moves on to the next frame. A frame
//! with a well-formed but unrecognized `type` is not an error; it decodes
//! to [`Frame::Unknown`] so the loop can log the tag and continue.

use crate::infrastructure::finnhub::messages::{ControlMessage, Frame, TradeBatchMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structurally valid JSON that is not a frame object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the Finnhub trade stream.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON, is valid JSON but
    /// not an object, or is a `trade` frame whose `data` has the wrong
    /// shape. An unrecognized `type` tag is **not** an error; it decodes
    /// to [`Frame::Unknown`].
    pub fn decode(&self, text: &str) -> Result<Frame, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        if !value.is_object() {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                truncate(text.trim(), 50)
            )));
        }

        let msg_type = value.get("type").and_then(|v| v.as_str());

        match msg_type {
            Some("trade") => {
                let batch: TradeBatchMessage = serde_json::from_value(value)?;
                Ok(Frame::TradeBatch(batch.data))
            }
            Some("ping") => Ok(Frame::KeepAlive),
            Some(other) => Ok(Frame::Unknown(other.to_string())),
            // No tag at all still flows through the unknown path; the
            // loop logs the empty tag rather than dropping silently.
            None => Ok(Frame::Unknown(String::new())),
        }
    }

    /// Encode an outbound control message to JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, message: &ControlMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
