//! Terminal Request Payloads
//!
//! Typed bodies for each channel. They serialize to the PascalCase JSON the
//! terminal expects and are embedded in a [`RoutingRequest`] as text.
//!
//! [`RoutingRequest`]: crate::domain::envelope::RoutingRequest

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::domain::envelope::Channel;

/// Payload validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    /// Archive range is inverted.
    #[error("first day {first} is after last day {last}")]
    InvertedRange {
        /// Requested first day.
        first: NaiveDate,
        /// Requested last day.
        last: NaiveDate,
    },

    /// Archive period multiplier must be positive.
    #[error("period must be at least 1")]
    ZeroPeriod,

    /// Order quantity must be positive.
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    /// Order price must be a finite non-negative number.
    #[error("price must be finite and non-negative, got {0}")]
    InvalidPrice(f64),

    /// Unknown enumeration text.
    #[error("unknown {kind} '{value}'")]
    Unknown {
        /// What was being parsed.
        kind: &'static str,
        /// The offending text.
        value: String,
    },
}

/// A typed body bound to the channel it is sent on.
pub trait TerminalPayload: Serialize {
    /// Channel the payload travels on.
    const CHANNEL: Channel;
}

// =============================================================================
// Data Query
// =============================================================================

/// Kind of reference/portfolio data requested on `#Data.Query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataQueryKind {
    /// Trading accounts.
    Accounts,
    /// Money balances per account.
    Balances,
    /// Open positions per account.
    Positions,
    /// Orders per account.
    Orders,
    /// Assets with their per-board instruments.
    Assets,
    /// Trading limits per account.
    Limits,
    /// Allowed order parameters per scope.
    AllowedOrderParams,
    /// Market boards.
    MarketBoards,
    /// Object (asset) groups.
    ObjectGroups,
    /// Object (asset) types.
    ObjectTypes,
    /// Subaccounts (portfolio sections).
    Razdels,
}

/// Body of a `#Data.Query` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataQuery {
    /// What to fetch.
    #[serde(rename = "Type")]
    pub kind: DataQueryKind,
    /// Restrict to one account, where the terminal supports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_account: Option<i64>,
}

impl DataQuery {
    /// Query that is not scoped to an account.
    #[must_use]
    pub const fn all(kind: DataQueryKind) -> Self {
        Self {
            kind,
            id_account: None,
        }
    }

    /// Query scoped to one account.
    #[must_use]
    pub const fn for_account(kind: DataQueryKind, account_id: i64) -> Self {
        Self {
            kind,
            id_account: Some(account_id),
        }
    }
}

impl TerminalPayload for DataQuery {
    const CHANNEL: Channel = Channel::DataQuery;
}

// =============================================================================
// Archive Query
// =============================================================================

/// Candle layout requested from the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleKind {
    /// Open/high/low/close/volume bars.
    Ohlcv,
    /// Market profile volume (price levels per bar).
    Mpv,
}

impl CandleKind {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ohlcv => 0,
            Self::Mpv => 2,
        }
    }

    /// Key under which the archive returns candles of this kind.
    #[must_use]
    pub const fn payload_key(self) -> &'static str {
        match self {
            Self::Ohlcv => "OHLCV",
            Self::Mpv => "MPV",
        }
    }
}

impl Serialize for CandleKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl FromStr for CandleKind {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ohlcv" | "0" => Ok(Self::Ohlcv),
            "mpv" | "2" => Ok(Self::Mpv),
            _ => Err(PayloadError::Unknown {
                kind: "candle kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Candle interval unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Seconds.
    Second,
    /// Minutes.
    Minute,
    /// Hours.
    Hour,
    /// Days.
    Day,
    /// Weeks.
    Week,
    /// Months.
    Month,
}

impl Interval {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "second" => Ok(Self::Second),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            _ => Err(PayloadError::Unknown {
                kind: "interval",
                value: s.to_string(),
            }),
        }
    }
}

/// Body of an `#Archive.Query` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveQuery {
    id_fi: i64,
    candle_type: CandleKind,
    interval: Interval,
    period: u32,
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl ArchiveQuery {
    /// Build an archive query over the inclusive day range.
    ///
    /// # Errors
    ///
    /// Returns an error if `period` is zero or the range is inverted.
    pub fn new(
        instrument_id: i64,
        kind: CandleKind,
        interval: Interval,
        period: u32,
        first_day: NaiveDate,
        last_day: NaiveDate,
    ) -> Result<Self, PayloadError> {
        if period == 0 {
            return Err(PayloadError::ZeroPeriod);
        }
        if first_day > last_day {
            return Err(PayloadError::InvertedRange {
                first: first_day,
                last: last_day,
            });
        }
        Ok(Self {
            id_fi: instrument_id,
            candle_type: kind,
            interval,
            period,
            first_day,
            last_day,
        })
    }

    /// Requested candle layout.
    #[must_use]
    pub const fn kind(&self) -> CandleKind {
        self.candle_type
    }
}

impl TerminalPayload for ArchiveQuery {
    const CHANNEL: Channel = Channel::ArchiveQuery;
}

// =============================================================================
// Orders
// =============================================================================

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl Side {
    /// Wire code (`1` buy, `-1` sell).
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }
}

impl Serialize for Side {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl FromStr for Side {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" | "1" => Ok(Self::Buy),
            "sell" | "-1" => Ok(Self::Sell),
            _ => Err(PayloadError::Unknown {
                kind: "side",
                value: s.to_string(),
            }),
        }
    }
}

/// Accept an order price: zero for market, otherwise finite and positive.
///
/// # Errors
///
/// Returns [`PayloadError::InvalidPrice`] for negative, NaN or infinite prices.
pub fn order_price(price: f64) -> Result<f64, PayloadError> {
    if !price.is_finite() || price < 0.0 {
        return Err(PayloadError::InvalidPrice(price));
    }
    Ok(price)
}

/// Body of an `#Order.Enter.Query` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderEnter {
    id_account: i64,
    id_razdel: i64,
    id_fi: i64,
    buy_sell: Side,
    quantity: i64,
    price: f64,
    comment: String,
}

impl OrderEnter {
    /// Build an order. A price of zero enters a market order.
    ///
    /// # Errors
    ///
    /// Returns an error on a non-positive quantity or an invalid price.
    pub fn new(
        account_id: i64,
        razdel_id: i64,
        instrument_id: i64,
        side: Side,
        quantity: i64,
        price: f64,
        comment: impl Into<String>,
    ) -> Result<Self, PayloadError> {
        if quantity <= 0 {
            return Err(PayloadError::NonPositiveQuantity(quantity));
        }
        let price = order_price(price)?;
        Ok(Self {
            id_account: account_id,
            id_razdel: razdel_id,
            id_fi: instrument_id,
            buy_sell: side,
            quantity,
            price,
            comment: comment.into(),
        })
    }
}

impl TerminalPayload for OrderEnter {
    const CHANNEL: Channel = Channel::OrderEnter;
}

/// Body of an `#Order.Cancel.Query` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderCancel {
    /// Account owning the order.
    pub id_account: i64,
    /// Terminal order number.
    pub num_order: i64,
}

impl TerminalPayload for OrderCancel {
    const CHANNEL: Channel = Channel::OrderCancel;
}

/// Body of an `#Order.Limit.Query` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderLimit {
    /// Account to check.
    pub id_account: i64,
    /// Subaccount to check.
    pub id_razdel: i64,
    /// Instrument.
    pub id_fi: i64,
    /// Direction.
    pub buy_sell: Side,
    /// Prospective price (zero for market).
    pub price: f64,
}

impl TerminalPayload for OrderLimit {
    const CHANNEL: Channel = Channel::OrderLimit;
}
