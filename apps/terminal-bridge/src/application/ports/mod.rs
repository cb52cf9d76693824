//! Port Interfaces
//!
//! Contracts between the application services and the adapters that talk
//! to the terminal, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FrameSink`: enqueue one outbound text frame on the terminal socket
//! - `TerminalPort`: send a payload on a channel and await its correlated
//!   response payload

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::domain::envelope::{Channel, EnvelopeError};

// =============================================================================
// Errors
// =============================================================================

/// Socket-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Refused to enqueue an empty frame.
    #[error("cannot send an empty frame")]
    EmptyFrame,

    /// Opening the socket failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectFailed(String),

    /// Writing to or reading from the socket failed.
    #[error("WebSocket error: {0}")]
    Socket(String),

    /// The channel is closed or closing.
    #[error("connection closed")]
    Closed,

    /// The writer went away before reporting the frame's fate.
    #[error("frame was dropped before delivery")]
    DeliveryDropped,
}

/// Why a correlated request produced no payload.
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    /// Building or reading an envelope failed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Sending the request failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The inbound stream carried a frame that breaks the envelope contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The inbound stream ended before the response arrived.
    #[error("response not received")]
    NotReceived,

    /// No response within the per-call timeout.
    #[error("response timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// The wait was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The correlator no longer accepts requests.
    #[error("terminal connection closed")]
    Closed,
}

// =============================================================================
// Frame Sink
// =============================================================================

/// Resolves once the writer has put the frame on the socket, or failed to.
#[derive(Debug)]
pub struct DeliveryReceipt {
    outcome: oneshot::Receiver<Result<(), TransportError>>,
}

impl DeliveryReceipt {
    /// Paired sender/receipt. The writer reports through the sender.
    #[must_use]
    pub fn channel() -> (oneshot::Sender<Result<(), TransportError>>, Self) {
        let (tx, outcome) = oneshot::channel();
        (tx, Self { outcome })
    }

    /// Receipt that has already resolved.
    #[must_use]
    pub fn resolved(outcome: Result<(), TransportError>) -> Self {
        let (tx, receipt) = Self::channel();
        let _ = tx.send(outcome);
        receipt
    }

    /// Wait for the write outcome.
    ///
    /// # Errors
    ///
    /// Returns the write failure, or [`TransportError::DeliveryDropped`] if
    /// the writer stopped without reporting.
    pub async fn delivered(self) -> Result<(), TransportError> {
        self.outcome
            .await
            .unwrap_or(Err(TransportError::DeliveryDropped))
    }
}

/// Outbound half of the terminal socket.
#[cfg_attr(test, mockall::automock)]
pub trait FrameSink: Send + Sync {
    /// Enqueue one text frame. Returns once queued, not once written.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::EmptyFrame`] for empty text and
    /// [`TransportError::Closed`] once the sink is closed.
    fn send(&self, text: String) -> Result<DeliveryReceipt, TransportError>;
}

// =============================================================================
// Terminal Port
// =============================================================================

/// Request/response access to the terminal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TerminalPort: Send + Sync {
    /// Send `payload` on `channel` and return the response payload with one
    /// layer of quoting removed.
    ///
    /// # Errors
    ///
    /// Returns a [`CorrelationError`] when no matching response arrives.
    async fn request(&self, channel: Channel, payload: Value) -> Result<String, CorrelationError>;
}
