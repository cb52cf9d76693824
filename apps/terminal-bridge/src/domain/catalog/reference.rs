//! Reference tables: market boards, object groups and types, allowed order
//! parameters.

use std::sync::LazyLock;

use crate::domain::entry::{Pipeline, ScopeFilter};
use crate::domain::schema::{Field, Rule, Schema};

/// Market boards.
pub static MARKET_BOARD: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdMarketBoard", "Market board identifier")),
        Rule::Text(Field::described("Code", "Market board code")),
        Rule::Text(Field::described("Name", "Market board name")),
        Rule::Text(Field::described("Currency", "Settlement currency")),
        Rule::Flag(Field::described("IsActive", "Whether trading is open")),
    ])
});

/// Object (asset) groups.
pub static OBJECT_GROUP: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdObjectGroup", "Asset group identifier")),
        Rule::Text(Field::described("Name", "Asset group name")),
    ])
});

/// Object (asset) types.
pub static OBJECT_TYPE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdObjectType", "Asset type identifier")),
        Rule::Whole(Field::described("IdObjectGroup", "Asset group identifier")),
        Rule::Text(Field::described("Code", "Asset type code")),
        Rule::Text(Field::described("Name", "Asset type name")),
    ])
});

/// Order parameters allowed for a group on a board.
pub static ALLOWED_ORDER_PARAM: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described(
            "IdAllowedOrderParams",
            "Allowed order parameters identifier",
        )),
        Rule::Whole(Field::described("IdObjectGroup", "Asset group identifier")),
        Rule::Whole(Field::described("IdMarketBoard", "Market board identifier")),
        Rule::Whole(Field::described("IdOrderType", "Order type identifier")),
        Rule::Whole(Field::described("IdDocumentType", "Document type identifier")),
        Rule::Whole(Field::described("IdQuantityType", "Quantity type identifier")),
        Rule::Whole(Field::described("IdPriceType", "Price type identifier")),
        Rule::Whole(Field::described("IdLifeTime", "Order lifetime identifier")),
        Rule::Whole(Field::described("IdExecutionType", "Execution type identifier")),
    ])
});

fn table(schema: &'static Schema, missing: &'static str, root: &'static str) -> Pipeline {
    Pipeline::new()
        .extract_array(super::DATA)
        .require_non_empty(missing)
        .map(schema)
        .wrap(root)
}

/// `{"market_boards": [...]}`.
#[must_use]
pub fn market_boards() -> Pipeline {
    table(&MARKET_BOARD, "Market boards are missing", "market_boards")
}

/// `{"object_groups": [...]}`.
#[must_use]
pub fn object_groups() -> Pipeline {
    table(&OBJECT_GROUP, "Object groups are missing", "object_groups")
}

/// `{"object_types": [...]}`.
#[must_use]
pub fn object_types() -> Pipeline {
    table(&OBJECT_TYPE, "Object types are missing", "object_types")
}

/// `{"allowed_order_params": [...]}` for an optional group and board.
#[must_use]
pub fn allowed_order_params(object_group: Option<i64>, market_board: Option<i64>) -> Pipeline {
    const MISSING: &str = "Allowed order params are missing";
    Pipeline::new()
        .extract_array(super::DATA)
        .filter(ScopeFilter::new(object_group, market_board), MISSING)
        .require_non_empty(MISSING)
        .map(&ALLOWED_ORDER_PARAM)
        .wrap("allowed_order_params")
}
