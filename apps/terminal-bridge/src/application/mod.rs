//! Application Layer - Use cases and port definitions.
//!
//! Ports describe what the application needs from the terminal connection;
//! services and tools turn feature requests into terminal round trips and
//! shaped JSON.

/// Port interfaces for the terminal connection.
pub mod ports;

/// Feature requests over the terminal port.
pub mod services;

/// Named tools with argument validation.
pub mod tools;
