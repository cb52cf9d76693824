//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, terminal link status and Prometheus
//! metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (terminal socket open)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::terminal::{Correlator, LinkState, LinkStatus};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Bridge version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Terminal socket status.
    pub terminal: TerminalInfo,
    /// Request statistics.
    pub requests: RequestStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Socket open.
    Healthy,
    /// Socket opening or closing.
    Degraded,
    /// Socket gone.
    Unhealthy,
}

/// Terminal socket status.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalInfo {
    /// Link state.
    pub state: &'static str,
    /// Whether frames can flow.
    pub connected: bool,
    /// When the socket opened.
    pub opened_at: Option<DateTime<Utc>>,
    /// Last socket error.
    pub error: Option<String>,
    /// Inbound frames received.
    pub frames_received: u64,
    /// Outbound frames written.
    pub frames_sent: u64,
}

/// Request statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStatus {
    /// Requests awaiting a response.
    pub pending: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    link: Arc<LinkStatus>,
    correlator: Arc<Correlator>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, link: Arc<LinkStatus>, correlator: Arc<Correlator>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            link,
            correlator,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.link.state() == LinkState::Open {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let terminal = terminal_info(&state.link);
    HealthResponse {
        status: determine_health_status(state.link.state()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        terminal,
        requests: RequestStatus {
            pending: state.correlator.pending_count(),
        },
    }
}

fn terminal_info(link: &LinkStatus) -> TerminalInfo {
    let state = link.state();
    TerminalInfo {
        state: state.as_str(),
        connected: state == LinkState::Open,
        opened_at: link.opened_at(),
        error: link.error_message(),
        frames_received: link.frames_received(),
        frames_sent: link.frames_sent(),
    }
}

const fn determine_health_status(state: LinkState) -> HealthStatus {
    match state {
        LinkState::Open => HealthStatus::Healthy,
        LinkState::Connecting | LinkState::Closing => HealthStatus::Degraded,
        LinkState::Closed | LinkState::Faulted => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_link_state() {
        assert_eq!(determine_health_status(LinkState::Open), HealthStatus::Healthy);
        assert_eq!(
            determine_health_status(LinkState::Connecting),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(LinkState::Closing),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(LinkState::Faulted),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn terminal_info_reports_error() {
        let link = LinkStatus::new();
        link.set_state(LinkState::Open);
        let info = terminal_info(&link);
        assert!(info.connected);
        assert!(info.opened_at.is_some());
        assert_eq!(info.state, "open");

        link.set_error("reset by peer".to_string());
        let info = terminal_info(&link);
        assert!(!info.connected);
        assert_eq!(info.state, "faulted");
        assert_eq!(info.error.as_deref(), Some("reset by peer"));
    }
}
