//! Bridge Configuration Settings
//!
//! Configuration types for the terminal bridge, loaded from environment
//! variables. The endpoint and timeout are required; everything else falls
//! back to a default when unset or unparseable.

use std::time::Duration;

use tokio_tungstenite::tungstenite::http::Uri;

/// Terminal connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSettings {
    /// Absolute `ws://` or `wss://` endpoint.
    pub endpoint: String,
    /// Default per-call correlation timeout.
    pub timeout: Duration,
    /// Capacity of the reader → dispatcher queue.
    pub inbound_capacity: usize,
    /// Upper bound on draining the outbound queue at close.
    pub close_timeout: Duration,
    /// How long an abandoned correlation id is remembered.
    pub late_grace: Duration,
}

impl TerminalSettings {
    /// Default reader → dispatcher queue capacity.
    pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;
    /// Default close drain bound.
    pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default abandoned-id grace period.
    pub const DEFAULT_LATE_GRACE: Duration = Duration::from_secs(30);

    /// Settings with defaults for everything but endpoint and timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an absolute WebSocket URI or
    /// the timeout is zero.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("0".to_string()));
        }
        Ok(Self {
            endpoint,
            timeout,
            inbound_capacity: Self::DEFAULT_INBOUND_CAPACITY,
            close_timeout: Self::DEFAULT_CLOSE_TIMEOUT,
            late_grace: Self::DEFAULT_LATE_GRACE,
        })
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Terminal connection settings.
    pub terminal: TerminalSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = required(&lookup, "TERMINAL_ENDPOINT")?;
        let timeout_raw = required(&lookup, "TERMINAL_TIMEOUT_MS")?;
        let timeout_ms = timeout_raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or(ConfigError::InvalidTimeout(timeout_raw))?;

        let mut terminal = TerminalSettings::new(endpoint, Duration::from_millis(timeout_ms))?;
        terminal.inbound_capacity = parse_or(
            &lookup,
            "TERMINAL_INBOUND_CAPACITY",
            TerminalSettings::DEFAULT_INBOUND_CAPACITY,
        )
        .max(1);
        terminal.close_timeout = parse_duration_millis(
            &lookup,
            "TERMINAL_CLOSE_TIMEOUT_MS",
            TerminalSettings::DEFAULT_CLOSE_TIMEOUT,
        );
        terminal.late_grace = parse_duration_millis(
            &lookup,
            "TERMINAL_LATE_GRACE_MS",
            TerminalSettings::DEFAULT_LATE_GRACE,
        );

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "BRIDGE_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self { terminal, server })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Endpoint is not an absolute WebSocket URI.
    #[error("invalid terminal endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The rejected value.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Timeout is not a positive number of milliseconds.
    #[error("terminal timeout must be a positive number of milliseconds, got '{0}'")]
    InvalidTimeout(String),
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };
    let uri: Uri = endpoint.parse().map_err(|e| invalid(&format!("{e}")))?;
    match uri.scheme_str() {
        Some("ws" | "wss") => {}
        Some(_) => return Err(invalid("scheme must be ws or wss")),
        None => return Err(invalid("not an absolute URI")),
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
