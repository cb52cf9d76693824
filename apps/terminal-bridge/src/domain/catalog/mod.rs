//! Entity Catalog
//!
//! Concrete schemas and pipelines for every kind of record the terminal
//! returns. Schemas are built once and shared.

pub mod accounts;
pub mod acks;
pub mod archive;
pub mod instruments;
pub mod portfolio;
pub mod reference;

/// Field most responses carry their records under.
pub const DATA: &str = "Data";

pub use accounts::accounts;
pub use acks::{order_cancelled, order_entered, order_limit};
pub use archive::candles;
pub use instruments::{AssetSelection, assets};
pub use portfolio::{
    AccountRecords, BALANCES, LIMITS, ORDERS, POSITIONS, SUBACCOUNTS, account_records, positions,
};
pub use reference::{allowed_order_params, market_boards, object_groups, object_types};
