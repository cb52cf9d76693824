//! Domain Layer - Wire envelopes, payloads and JSON reshaping.
//!
//! Pure logic with no I/O. Everything here can be exercised from unit
//! tests without a terminal.

/// Routing envelopes, correlation ids and channels.
pub mod envelope;

/// Typed request bodies per channel.
pub mod payloads;

/// Rule/schema engine.
pub mod schema;

/// Entry pipeline stages and filters.
pub mod entry;

/// Concrete schemas and pipelines per entity kind.
pub mod catalog;
