//! Tool Catalog
//!
//! Named operations exposed to the tool-invocation front end. Each tool
//! has a description and an input JSON schema; [`ToolCatalog::call`]
//! validates the raw argument map and dispatches to the gateway.

mod args;

use serde_json::{Value, json};

use self::args::Arguments;
use crate::application::ports::TerminalPort;
use crate::application::services::{GatewayError, TerminalGateway};
use crate::domain::catalog::AssetSelection;
use crate::domain::payloads::{
    ArchiveQuery, CandleKind, OrderCancel, OrderEnter, OrderLimit, PayloadError, order_price,
};

// =============================================================================
// Errors
// =============================================================================

/// Tool invocation failure.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No tool with that name.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// An argument is absent, of the wrong type or out of range.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The request reached the terminal and failed there.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ToolError {
    fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.to_string(),
        }
    }

    fn payload(name: &'static str) -> impl FnOnce(PayloadError) -> Self {
        move |e| Self::invalid(name, e)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Static description of one tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    /// Tool name.
    pub name: &'static str,
    /// What the tool returns.
    pub description: &'static str,
    input_schema: fn() -> Value,
}

impl ToolSpec {
    /// JSON schema of the tool's arguments.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        (self.input_schema)()
    }
}

fn no_args() -> Value {
    json!({"type": "object", "properties": {}})
}

fn account_args() -> Value {
    json!({
        "type": "object",
        "properties": {"account_id": {"type": "integer", "description": "Account identifier"}},
        "required": ["account_id"]
    })
}

fn asset_args() -> Value {
    json!({
        "type": "object",
        "properties": {
            "ids": {"type": "array", "items": {"type": "integer"}, "description": "Asset identifiers"},
            "tickers": {"type": "array", "items": {"type": "string"}, "description": "Tickers, case-insensitive"}
        }
    })
}

fn scope_args() -> Value {
    json!({
        "type": "object",
        "properties": {
            "object_group": {"type": "integer", "description": "Asset group identifier"},
            "market_board": {"type": "integer", "description": "Market board identifier"}
        }
    })
}

fn candle_args() -> Value {
    json!({
        "type": "object",
        "properties": {
            "instrument_id": {"type": "integer", "description": "Financial instrument identifier"},
            "candle_kind": {"type": "string", "enum": ["ohlcv", "mpv"], "default": "ohlcv"},
            "interval": {"type": "string", "enum": ["second", "minute", "hour", "day", "week", "month"]},
            "period": {"type": "integer", "minimum": 1, "default": 1},
            "first_day": {"type": "string", "format": "date"},
            "last_day": {"type": "string", "format": "date"}
        },
        "required": ["instrument_id", "interval", "first_day", "last_day"]
    })
}

fn enter_args() -> Value {
    json!({
        "type": "object",
        "properties": {
            "account_id": {"type": "integer"},
            "razdel_id": {"type": "integer", "description": "Subaccount identifier"},
            "instrument_id": {"type": "integer"},
            "side": {"type": "string", "enum": ["buy", "sell"]},
            "quantity": {"type": "integer", "minimum": 1},
            "price": {"type": "number", "minimum": 0, "default": 0, "description": "0 for a market order"},
            "comment": {"type": "string", "default": ""}
        },
        "required": ["account_id", "razdel_id", "instrument_id", "side", "quantity"]
    })
}

fn cancel_args() -> Value {
    json!({
        "type": "object",
        "properties": {
            "account_id": {"type": "integer"},
            "order_number": {"type": "integer"}
        },
        "required": ["account_id", "order_number"]
    })
}

fn limit_args() -> Value {
    json!({
        "type": "object",
        "properties": {
            "account_id": {"type": "integer"},
            "razdel_id": {"type": "integer"},
            "instrument_id": {"type": "integer"},
            "side": {"type": "string", "enum": ["buy", "sell"]},
            "price": {"type": "number", "minimum": 0, "default": 0}
        },
        "required": ["account_id", "razdel_id", "instrument_id", "side"]
    })
}

/// Every tool, in listing order.
pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_accounts",
        description: "List trading accounts",
        input_schema: no_args,
    },
    ToolSpec {
        name: "get_balances",
        description: "Money balances of an account",
        input_schema: account_args,
    },
    ToolSpec {
        name: "get_positions",
        description: "Open positions of an account",
        input_schema: account_args,
    },
    ToolSpec {
        name: "get_orders",
        description: "Orders of an account",
        input_schema: account_args,
    },
    ToolSpec {
        name: "get_limits",
        description: "Trading limits of an account",
        input_schema: account_args,
    },
    ToolSpec {
        name: "get_subaccounts",
        description: "Subaccounts of an account",
        input_schema: account_args,
    },
    ToolSpec {
        name: "get_assets",
        description: "Assets and their instruments, by id or ticker",
        input_schema: asset_args,
    },
    ToolSpec {
        name: "get_allowed_order_params",
        description: "Order parameters allowed for an asset group on a board",
        input_schema: scope_args,
    },
    ToolSpec {
        name: "get_market_boards",
        description: "Market boards",
        input_schema: no_args,
    },
    ToolSpec {
        name: "get_object_groups",
        description: "Asset groups",
        input_schema: no_args,
    },
    ToolSpec {
        name: "get_object_types",
        description: "Asset types",
        input_schema: no_args,
    },
    ToolSpec {
        name: "get_candles",
        description: "Archived OHLCV or market-profile candles",
        input_schema: candle_args,
    },
    ToolSpec {
        name: "enter_order",
        description: "Enter a limit or market order",
        input_schema: enter_args,
    },
    ToolSpec {
        name: "cancel_order",
        description: "Cancel an order",
        input_schema: cancel_args,
    },
    ToolSpec {
        name: "get_order_limit",
        description: "Maximum size of a prospective order",
        input_schema: limit_args,
    },
];

/// Tool front end over a [`TerminalGateway`].
pub struct ToolCatalog<T: TerminalPort> {
    gateway: TerminalGateway<T>,
}

impl<T: TerminalPort> ToolCatalog<T> {
    /// Create a catalog over a gateway.
    pub const fn new(gateway: TerminalGateway<T>) -> Self {
        Self { gateway }
    }

    /// `[{"name", "description", "inputSchema"}, ...]`.
    #[must_use]
    pub fn list(&self) -> Value {
        Value::Array(
            TOOLS
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "inputSchema": tool.input_schema(),
                    })
                })
                .collect(),
        )
    }

    /// Run one tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`], [`ToolError::InvalidArgument`]
    /// naming the offending argument, or the gateway failure.
    pub async fn call(&self, name: &str, arguments: &Value) -> Result<Value, ToolError> {
        let args = Arguments::new(arguments)?;
        tracing::debug!(tool = name, "Calling tool");

        let gateway = &self.gateway;
        let result = match name {
            "get_accounts" => gateway.accounts().await,
            "get_balances" => gateway.balances(args.whole("account_id")?).await,
            "get_positions" => gateway.positions(args.whole("account_id")?).await,
            "get_orders" => gateway.orders(args.whole("account_id")?).await,
            "get_limits" => gateway.limits(args.whole("account_id")?).await,
            "get_subaccounts" => gateway.subaccounts(args.whole("account_id")?).await,
            "get_assets" => gateway.assets(asset_selection(&args)?).await,
            "get_allowed_order_params" => {
                gateway
                    .allowed_order_params(
                        args.optional_whole("object_group")?,
                        args.optional_whole("market_board")?,
                    )
                    .await
            }
            "get_market_boards" => gateway.market_boards().await,
            "get_object_groups" => gateway.object_groups().await,
            "get_object_types" => gateway.object_types().await,
            "get_candles" => gateway.candles(archive_query(&args)?).await,
            "enter_order" => gateway.enter_order(order_enter(&args)?).await,
            "cancel_order" => {
                gateway
                    .cancel_order(OrderCancel {
                        id_account: args.whole("account_id")?,
                        num_order: args.whole("order_number")?,
                    })
                    .await
            }
            "get_order_limit" => gateway.order_limit(order_limit(&args)?).await,
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        Ok(result?)
    }
}

fn asset_selection(args: &Arguments<'_>) -> Result<AssetSelection, ToolError> {
    match (args.whole_list("ids")?, args.text_list("tickers")?) {
        (Some(_), Some(_)) => Err(ToolError::invalid(
            "tickers",
            "give either ids or tickers, not both",
        )),
        (Some(ids), None) => Ok(AssetSelection::Ids(ids)),
        (None, Some(tickers)) => Ok(AssetSelection::Tickers(tickers)),
        (None, None) => Ok(AssetSelection::All),
    }
}

fn archive_query(args: &Arguments<'_>) -> Result<ArchiveQuery, ToolError> {
    let kind = args
        .optional_text("candle_kind")?
        .map_or(Ok(CandleKind::Ohlcv), |kind| kind.parse())
        .map_err(ToolError::payload("candle_kind"))?;
    let interval = args
        .text("interval")?
        .parse()
        .map_err(ToolError::payload("interval"))?;
    let period = args.optional_whole("period")?.unwrap_or(1);
    let period = u32::try_from(period).map_err(|_| ToolError::invalid("period", "out of range"))?;
    ArchiveQuery::new(
        args.whole("instrument_id")?,
        kind,
        interval,
        period,
        args.date("first_day")?,
        args.date("last_day")?,
    )
    .map_err(|e| match e {
        PayloadError::ZeroPeriod => ToolError::invalid("period", e),
        other => ToolError::invalid("first_day", other),
    })
}

fn order_enter(args: &Arguments<'_>) -> Result<OrderEnter, ToolError> {
    let side = args.text("side")?.parse().map_err(ToolError::payload("side"))?;
    OrderEnter::new(
        args.whole("account_id")?,
        args.whole("razdel_id")?,
        args.whole("instrument_id")?,
        side,
        args.whole("quantity")?,
        args.optional_real("price")?.unwrap_or(0.0),
        args.optional_text("comment")?.unwrap_or_default(),
    )
    .map_err(|e| match e {
        PayloadError::InvalidPrice(_) => ToolError::invalid("price", e),
        other => ToolError::invalid("quantity", other),
    })
}

fn order_limit(args: &Arguments<'_>) -> Result<OrderLimit, ToolError> {
    let price = order_price(args.optional_real("price")?.unwrap_or(0.0))
        .map_err(ToolError::payload("price"))?;
    Ok(OrderLimit {
        id_account: args.whole("account_id")?,
        id_razdel: args.whole("razdel_id")?,
        id_fi: args.whole("instrument_id")?,
        buy_sell: args.text("side")?.parse().map_err(ToolError::payload("side"))?,
        price,
    })
}
