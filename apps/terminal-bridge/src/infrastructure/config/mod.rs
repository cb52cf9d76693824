//! Configuration Module
//!
//! Configuration loading for the terminal bridge.

mod settings;

pub use settings::{BridgeConfig, ConfigError, ServerSettings, TerminalSettings};
