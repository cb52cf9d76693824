//! Envelope Codec
//!
//! Encodes outbound routing requests and classifies inbound text frames as
//! heartbeats or response envelopes.

use serde_json::Value;

use crate::domain::envelope::{EnvelopeError, RoutingRequest, RoutingResponse, is_heartbeat};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not JSON at all.
    #[error("frame is not valid JSON ({preview}): {source}")]
    Json {
        /// Start of the offending frame.
        preview: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },

    /// Frame is JSON but breaks the envelope contract.
    #[error("malformed envelope: {source}")]
    Malformed {
        /// `Id` of the frame, when it carries a readable one.
        id: Option<String>,
        /// What is wrong with it.
        #[source]
        source: EnvelopeError,
    },
}

impl CodecError {
    /// Correlation id of the offending frame, if readable.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Json { .. } => None,
            Self::Malformed { id, .. } => id.as_deref(),
        }
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Keep-alive; never correlated.
    Heartbeat,
    /// Candidate response envelope.
    Response(RoutingResponse),
}

/// JSON envelope codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a request as one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, request: &RoutingRequest) -> Result<String, EnvelopeError> {
        request.to_json()
    }

    /// Classify one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] for non-JSON text and
    /// [`CodecError::Malformed`] when an envelope field is absent or not a
    /// string.
    pub fn decode(&self, text: &str) -> Result<Frame, CodecError> {
        let value: Value = serde_json::from_str(text).map_err(|source| CodecError::Json {
            preview: preview(text),
            source,
        })?;

        if is_heartbeat(&value) {
            return Ok(Frame::Heartbeat);
        }

        RoutingResponse::from_value(&value)
            .map(Frame::Response)
            .map_err(|source| CodecError::Malformed {
                id: value.get("Id").and_then(Value::as_str).map(str::to_string),
                source,
            })
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 50;
    let mut preview: String = text.trim().chars().take(LIMIT).collect();
    if text.trim().chars().count() > LIMIT {
        preview.push_str("...");
    }
    preview
}
