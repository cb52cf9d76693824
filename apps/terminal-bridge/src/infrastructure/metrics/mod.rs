//! Prometheus Metrics Module
//!
//! Exposes bridge metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: inbound frames, heartbeats, unmatched frames
//! - **Requests**: correlated requests by channel and outcome
//! - **Pending**: waiters currently registered with the correlator
//! - **Latency**: request round-trip time per channel
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::ports::CorrelationError;
use crate::domain::envelope::Channel;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            #[allow(clippy::expect_used)]
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "terminal_bridge_frames_received_total",
        "Total text frames received from the terminal"
    );
    describe_counter!(
        "terminal_bridge_heartbeats_total",
        "Total heartbeat frames dropped before dispatch"
    );
    describe_counter!(
        "terminal_bridge_unmatched_frames_total",
        "Total response frames that matched no pending request"
    );
    describe_counter!(
        "terminal_bridge_protocol_errors_total",
        "Total malformed frames received"
    );
    describe_counter!(
        "terminal_bridge_requests_total",
        "Total correlated requests by channel and outcome"
    );
    describe_gauge!(
        "terminal_bridge_pending_requests",
        "Requests currently awaiting a response"
    );
    describe_histogram!(
        "terminal_bridge_request_duration_seconds",
        "Time from enqueueing a request to its outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a response frame was not delivered to anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmatched {
    /// No waiter has ever registered this id, or it expired.
    UnknownId,
    /// The id belongs to a waiter that gave up recently.
    Late,
    /// The id is pending but command or channel differ.
    Mismatch,
}

impl Unmatched {
    const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownId => "unknown_id",
            Self::Late => "late",
            Self::Mismatch => "mismatch",
        }
    }
}

/// Metric label for a request outcome.
#[must_use]
pub const fn outcome_label(result: Result<(), &CorrelationError>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(CorrelationError::Envelope(_)) => "envelope",
        Err(CorrelationError::Transport(_)) => "transport",
        Err(CorrelationError::Protocol(_)) => "protocol",
        Err(CorrelationError::NotReceived) => "not_received",
        Err(CorrelationError::TimedOut(_)) => "timeout",
        Err(CorrelationError::Cancelled) => "cancelled",
        Err(CorrelationError::Closed) => "closed",
    }
}

/// Record one inbound text frame.
pub fn record_frame_received() {
    counter!("terminal_bridge_frames_received_total").increment(1);
}

/// Record one dropped heartbeat.
pub fn record_heartbeat() {
    counter!("terminal_bridge_heartbeats_total").increment(1);
}

/// Record a response frame nobody was waiting for.
pub fn record_unmatched(reason: Unmatched) {
    counter!(
        "terminal_bridge_unmatched_frames_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a malformed frame.
pub fn record_protocol_error() {
    counter!("terminal_bridge_protocol_errors_total").increment(1);
}

/// Record a finished request.
pub fn record_request(channel: Channel, outcome: &'static str, duration: Duration) {
    counter!(
        "terminal_bridge_requests_total",
        "channel" => channel.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(
        "terminal_bridge_request_duration_seconds",
        "channel" => channel.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Update the pending request gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_pending_requests(count: usize) {
    gauge!("terminal_bridge_pending_requests").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
