//! Element predicates used by filter stages.

use std::collections::HashSet;

use serde_json::Value;

/// Predicate over one JSON element.
pub trait Filter: Send + Sync {
    /// Whether the element is kept.
    fn matches(&self, element: &Value) -> bool;
}

impl<F> Filter for F
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn matches(&self, element: &Value) -> bool {
        self(element)
    }
}

fn whole(element: &Value, field: &str) -> Option<i64> {
    element.get(field).and_then(Value::as_i64)
}

/// Keeps records owned by one account (`IdAccount`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountFilter {
    account_id: i64,
}

impl AccountFilter {
    /// Field holding the account id.
    pub const FIELD: &'static str = "IdAccount";

    /// Filter for one account.
    #[must_use]
    pub const fn new(account_id: i64) -> Self {
        Self { account_id }
    }
}

impl Filter for AccountFilter {
    fn matches(&self, element: &Value) -> bool {
        whole(element, Self::FIELD) == Some(self.account_id)
    }
}

/// Keeps assets whose `IdObject` is in a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFilter {
    ids: HashSet<i64>,
}

impl AssetFilter {
    /// Field holding the asset id.
    pub const FIELD: &'static str = "IdObject";

    /// Filter for a set of asset ids.
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }
}

impl Filter for AssetFilter {
    fn matches(&self, element: &Value) -> bool {
        whole(element, Self::FIELD).is_some_and(|id| self.ids.contains(&id))
    }
}

/// Keeps assets whose `Ticker` is in a set, ignoring case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerFilter {
    tickers: HashSet<String>,
}

impl TickerFilter {
    /// Field holding the ticker.
    pub const FIELD: &'static str = "Ticker";

    /// Filter for a set of tickers.
    pub fn new<S: AsRef<str>>(tickers: impl IntoIterator<Item = S>) -> Self {
        Self {
            tickers: tickers
                .into_iter()
                .map(|t| t.as_ref().trim().to_uppercase())
                .collect(),
        }
    }
}

impl Filter for TickerFilter {
    fn matches(&self, element: &Value) -> bool {
        element
            .get(Self::FIELD)
            .and_then(Value::as_str)
            .is_some_and(|ticker| self.tickers.contains(&ticker.trim().to_uppercase()))
    }
}

/// Matches allowed-order-parameter records against an object group and a
/// market board.
///
/// A side left unset in the query is a wildcard; otherwise the record's id
/// must equal it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeFilter {
    object_group: Option<i64>,
    market_board: Option<i64>,
}

impl ScopeFilter {
    /// Field holding the object group id.
    pub const GROUP_FIELD: &'static str = "IdObjectGroup";
    /// Field holding the market board id.
    pub const BOARD_FIELD: &'static str = "IdMarketBoard";

    /// Filter for an optional group and board.
    #[must_use]
    pub const fn new(object_group: Option<i64>, market_board: Option<i64>) -> Self {
        Self {
            object_group,
            market_board,
        }
    }

    fn side(element: &Value, field: &str, wanted: Option<i64>) -> bool {
        wanted.is_none_or(|wanted| whole(element, field) == Some(wanted))
    }
}

impl Filter for ScopeFilter {
    fn matches(&self, element: &Value) -> bool {
        Self::side(element, Self::GROUP_FIELD, self.object_group)
            && Self::side(element, Self::BOARD_FIELD, self.market_board)
    }
}
