#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Terminal Bridge - Trading Terminal Request/Response Bridge
//!
//! Keeps one WebSocket connection to a trading terminal that answers
//! correlation-id-tagged requests interleaved with heartbeat frames, and
//! turns the terminal's raw records into stable, described JSON for a
//! tool-invocation front end.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Envelope, payload and reshaping logic
//!   - `envelope`: Routing envelopes, channels, correlation ids
//!   - `payloads`: Typed request payloads per channel
//!   - `schema`: Declarative rule/schema engine
//!   - `entry`: Extract → filter → require → map → wrap pipelines
//!   - `catalog`: Concrete schemas and pipelines per entity
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `TerminalPort` and `FrameSink`
//!   - `services`: `TerminalGateway`, one method per feature request
//!   - `tools`: Named tools with input schemas
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `terminal`: Transport, envelope codec and correlator
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! tool call ──► ToolCatalog ──► TerminalGateway ──► Correlator ──► Transport ──► Terminal
//!                                     ▲                  │
//!                                     └── entry pipeline ◄┘ (matched response payload)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Envelopes, payloads and reshaping with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::envelope::{Channel, CorrelationId, RoutingRequest, RoutingResponse};
pub use domain::entry::EntryError;
pub use domain::schema::{Schema, SchemaError};

// Application
pub use application::ports::{CorrelationError, TerminalPort, TransportError};
pub use application::services::{GatewayError, TerminalGateway};
pub use application::tools::{ToolCatalog, ToolError};

// Infrastructure config
pub use infrastructure::config::{BridgeConfig, ConfigError, ServerSettings, TerminalSettings};

// Terminal adapter
pub use infrastructure::terminal::{
    Correlator, CorrelatorSettings, LinkState, LinkStatus, TerminalConnection, Transport,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
