//! Assets and the per-board instruments they trade as.

use std::sync::LazyLock;

use crate::domain::entry::{AssetFilter, Pipeline, TickerFilter};
use crate::domain::schema::{Field, Rule, Schema};

/// Message when the selection matches no asset.
pub const ASSETS_MISSING: &str = "Assets are missing";

/// One tradeable instrument of an asset on a market board.
pub static INSTRUMENT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdFi", "Financial instrument identifier")),
        Rule::Whole(Field::described("IdMarketBoard", "Market board identifier")),
        Rule::Text(Field::described("Board", "Market board code")),
        Rule::Whole(Field::described("LotSize", "Units per lot")),
        Rule::Real(Field::described("PriceStep", "Minimum price increment")),
        Rule::Whole(Field::described("Decimals", "Price precision")),
    ])
});

/// Asset with its instruments nested.
pub static ASSET: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdObject", "Asset identifier")),
        Rule::Text(Field::described("Ticker", "Asset ticker")),
        Rule::Text(Field::described("Name", "Asset name")),
        Rule::Text(Field::described("Isin", "ISIN code")),
        Rule::Whole(Field::described("IdObjectType", "Asset type identifier")),
        Rule::Whole(Field::described("IdObjectGroup", "Asset group identifier")),
        Rule::Real(Field::described("Nominal", "Nominal value")),
        Rule::Array {
            source: "Instruments",
            target: "Instruments",
            schema: INSTRUMENT.clone(),
        },
    ])
});

/// Which assets to return.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssetSelection {
    /// Every asset.
    #[default]
    All,
    /// Assets by `IdObject`.
    Ids(Vec<i64>),
    /// Assets by ticker, ignoring case.
    Tickers(Vec<String>),
}

/// `{"Data": [...]}` → `{"assets": [...]}`.
#[must_use]
pub fn assets(selection: AssetSelection) -> Pipeline {
    let pipeline = Pipeline::new().extract_array(super::DATA);
    let pipeline = match selection {
        AssetSelection::All => pipeline,
        AssetSelection::Ids(ids) => pipeline.filter(AssetFilter::new(ids), ASSETS_MISSING),
        AssetSelection::Tickers(tickers) => {
            pipeline.filter(TickerFilter::new(tickers), ASSETS_MISSING)
        }
    };
    pipeline
        .require_non_empty(ASSETS_MISSING)
        .map(&ASSET)
        .wrap("assets")
}
