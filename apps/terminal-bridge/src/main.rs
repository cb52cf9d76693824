//! Terminal Bridge Binary
//!
//! Connects to the trading terminal and serves tool calls as
//! newline-delimited JSON over stdin/stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin terminal-bridge
//! ```
//!
//! # Protocol
//!
//! One request object per stdin line, one reply object per stdout line:
//!
//! ```text
//! → {"id": 1, "list": true}
//! ← {"id": 1, "result": [{"name": "get_accounts", ...}, ...]}
//! → {"id": 2, "tool": "get_balances", "arguments": {"account_id": 7}}
//! ← {"id": 2, "result": {"balances": [...]}}
//! ← {"id": 3, "error": "invalid argument 'account_id': missing"}
//! ```
//!
//! Requests are served concurrently; replies may come back in any order.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TERMINAL_ENDPOINT`: Terminal WebSocket URI (`ws://` or `wss://`)
//! - `TERMINAL_TIMEOUT_MS`: Per-call response timeout in milliseconds
//!
//! ## Optional
//! - `TERMINAL_INBOUND_CAPACITY`: Inbound frame queue size (default: 1024)
//! - `TERMINAL_CLOSE_TIMEOUT_MS`: Close drain bound (default: 5000)
//! - `TERMINAL_LATE_GRACE_MS`: Abandoned-id memory (default: 30000)
//! - `BRIDGE_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: terminal-bridge)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Value, json};
use terminal_bridge::infrastructure::health::{HealthServer, HealthServerState};
use terminal_bridge::infrastructure::telemetry;
use terminal_bridge::{
    BridgeConfig, Correlator, TerminalConnection, TerminalGateway, ToolCatalog, init_metrics,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

type Catalog = ToolCatalog<Correlator>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Terminal Bridge");

    let _metrics_handle = init_metrics();

    let config = BridgeConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let connection = TerminalConnection::open(&config.terminal, shutdown_token.clone())
        .await
        .context("could not connect to the terminal")?;
    let correlator = connection.correlator();

    let health_handle = if config.server.health_port == 0 {
        None
    } else {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            connection.link(),
            Arc::clone(&correlator),
        ));
        let server = HealthServer::new(config.server.health_port, state, shutdown_token.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "Health server failed");
            }
        }))
    };

    let catalog = Arc::new(ToolCatalog::new(TerminalGateway::new(correlator)));

    tokio::select! {
        () = await_shutdown() => {}
        () = serve_stdio(catalog, shutdown_token.clone()) => {
            tracing::info!("Stdin closed, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, connection.close())
        .await
        .is_err()
    {
        tracing::warn!("Terminal connection did not close in time");
    }
    if let Some(handle) = health_handle {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
    }

    tracing::info!("Terminal Bridge stopped");
    Ok(())
}

// =============================================================================
// Stdio Bridge
// =============================================================================

/// One line of input.
#[derive(Debug, Deserialize)]
struct BridgeRequest {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    arguments: Value,
    #[serde(default)]
    list: bool,
}

/// Read requests until stdin ends, answering each on its own task.
async fn serve_stdio(catalog: Arc<Catalog>, shutdown: CancellationToken) {
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(write_replies(reply_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut calls = JoinSet::new();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let catalog = Arc::clone(&catalog);
        let reply_tx = reply_tx.clone();
        calls.spawn(async move {
            let reply = answer(&catalog, &line).await;
            let _ = reply_tx.send(reply);
        });

        while calls.try_join_next().is_some() {}
    }

    // Let calls already in flight reply before the terminal closes.
    while calls.join_next().await.is_some() {}
    drop(reply_tx);
    let _ = writer.await;
}

async fn answer(catalog: &Catalog, line: &str) -> Value {
    let request: BridgeRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable request line");
            return json!({"id": Value::Null, "error": format!("invalid request: {e}")});
        }
    };

    if request.list {
        return json!({"id": request.id, "result": catalog.list()});
    }
    let Some(tool) = request.tool else {
        return json!({"id": request.id, "error": "request needs either 'tool' or 'list'"});
    };

    match catalog.call(&tool, &request.arguments).await {
        Ok(result) => json!({"id": request.id, "result": result}),
        Err(e) => {
            tracing::debug!(tool = %tool, error = %e, "Tool call failed");
            json!({"id": request.id, "error": e.to_string()})
        }
    }
}

async fn write_replies(mut replies: mpsc::UnboundedReceiver<Value>) {
    let mut stdout = tokio::io::stdout();
    while let Some(reply) = replies.recv().await {
        let mut line = reply.to_string();
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "Failed to write reply");
            break;
        }
        let _ = stdout.flush().await;
    }
}

// =============================================================================
// Bootstrap Helpers
// =============================================================================

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &BridgeConfig) {
    tracing::info!(
        endpoint = %config.terminal.endpoint,
        timeout_ms = config.terminal.timeout.as_millis(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        inbound_capacity = config.terminal.inbound_capacity,
        close_timeout_ms = config.terminal.close_timeout.as_millis(),
        late_grace_ms = config.terminal.late_grace.as_millis(),
        "Terminal tuning"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
