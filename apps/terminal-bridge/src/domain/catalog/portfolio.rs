//! Per-account records: balances, positions, orders, limits, subaccounts.
//!
//! Every one of them is the same pipeline over `Data` with a different
//! schema: filter by `IdAccount`, require something left, reshape, wrap.

use std::sync::LazyLock;

use crate::domain::entry::{AccountFilter, Fallback, Pipeline};
use crate::domain::schema::{Field, Rule, Schema};

/// Money balances.
pub static BALANCE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        Rule::Whole(Field::described("IdRazdel", "Subaccount identifier")),
        Rule::Text(Field::described("Currency", "Currency code")),
        Rule::Real(Field::described("Balance", "Current balance")),
        Rule::Real(Field::described("Blocked", "Amount blocked by active orders")),
        Rule::Real(Field::described("Available", "Amount available for trading")),
    ])
});

/// Open positions.
pub static POSITION: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        Rule::Whole(Field::described("IdRazdel", "Subaccount identifier")),
        Rule::Whole(Field::described("IdFi", "Financial instrument identifier")),
        Rule::Text(Field::described("Ticker", "Instrument ticker")),
        Rule::Whole(Field::described("Qty", "Quantity held")),
        Rule::Real(Field::described("AveragePrice", "Average entry price")),
        Rule::Real(Field::described("LastPrice", "Last traded price")),
        Rule::Real(Field::described("ProfitLoss", "Unrealised profit or loss")),
    ])
});

/// Orders.
pub static ORDER: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("NumOrder", "Order number")),
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        Rule::Whole(Field::described("IdRazdel", "Subaccount identifier")),
        Rule::Whole(Field::described("IdFi", "Financial instrument identifier")),
        Rule::Text(Field::described("Ticker", "Instrument ticker")),
        Rule::Whole(Field::described("BuySell", "Direction: 1 buy, -1 sell")),
        Rule::Whole(Field::described("Quantity", "Ordered quantity")),
        Rule::Whole(Field::described("Executed", "Filled quantity")),
        Rule::Real(Field::described("Price", "Limit price, 0 for market orders")),
        Rule::Text(Field::described("Status", "Order status")),
        Rule::Text(Field::described("Comment", "Client comment")),
        Rule::Text(Field::described("AcceptTime", "Time the order was accepted")),
    ])
});

/// Trading limits.
pub static LIMIT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        Rule::Whole(Field::described("IdRazdel", "Subaccount identifier")),
        Rule::Whole(Field::described("IdFi", "Financial instrument identifier")),
        Rule::Text(Field::described("Ticker", "Instrument ticker")),
        Rule::Real(Field::described("Limit", "Limit amount")),
        Rule::Real(Field::described("Used", "Amount used")),
        Rule::Real(Field::described("Free", "Amount remaining")),
    ])
});

/// Subaccounts (portfolio sections).
pub static SUBACCOUNT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdRazdel", "Subaccount identifier")),
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        Rule::Text(Field::described("Code", "Subaccount code")),
        Rule::Text(Field::described("Name", "Subaccount name")),
        Rule::Flag(Field::described("IsMain", "Whether this is the main subaccount")),
    ])
});

/// Root key and missing-data message for an account-scoped record kind.
#[derive(Debug, Clone, Copy)]
pub struct AccountRecords {
    root: &'static str,
    schema: &'static LazyLock<Schema>,
}

impl AccountRecords {
    /// Root key of the result.
    #[must_use]
    pub const fn root(&self) -> &'static str {
        self.root
    }

    /// "Account <kind> are missing".
    #[must_use]
    pub fn missing(&self) -> String {
        format!("Account {} are missing", self.root)
    }

    fn pipeline(&self, source: &'static str, account_id: i64) -> Pipeline {
        Pipeline::new()
            .extract_array(source)
            .filter(AccountFilter::new(account_id), self.missing())
            .require_non_empty(self.missing())
            .map(self.schema)
            .wrap(self.root)
    }
}

/// Balances.
pub static BALANCES: AccountRecords = AccountRecords {
    root: "balances",
    schema: &BALANCE,
};
/// Positions.
pub static POSITIONS: AccountRecords = AccountRecords {
    root: "positions",
    schema: &POSITION,
};
/// Orders.
pub static ORDERS: AccountRecords = AccountRecords {
    root: "orders",
    schema: &ORDER,
};
/// Limits.
pub static LIMITS: AccountRecords = AccountRecords {
    root: "limits",
    schema: &LIMIT,
};
/// Subaccounts.
pub static SUBACCOUNTS: AccountRecords = AccountRecords {
    root: "subaccounts",
    schema: &SUBACCOUNT,
};

/// Account-scoped pipeline over `Data`.
#[must_use]
pub fn account_records(kind: AccountRecords, account_id: i64) -> Pipeline {
    kind.pipeline(super::DATA, account_id)
}

/// Positions are read from `Positions` when the terminal sends them there,
/// otherwise from `Data`.
#[must_use]
pub fn positions(account_id: i64) -> Fallback<Pipeline, Pipeline> {
    Fallback::new(
        POSITIONS.pipeline("Positions", account_id),
        POSITIONS.pipeline(super::DATA, account_id),
    )
}
