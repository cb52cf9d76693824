//! Order acknowledgements.
//!
//! Enter, cancel and limit queries answer with one object under `Data`. A
//! rejection is reported in `Error`; accepted requests may omit it or send
//! `null`, both of which read as code 0 with an empty message.

use std::sync::LazyLock;

use serde_json::{Map, Value, json};

use crate::domain::entry::Pipeline;
use crate::domain::schema::{Field, Rule, Schema};

/// `Error` as reported for an accepted request.
#[must_use]
pub fn error_seed() -> Map<String, Value> {
    let mut seed = Map::with_capacity(2);
    seed.insert("Code".to_string(), json!(0));
    seed.insert("Message".to_string(), json!(""));
    seed
}

fn error_rule() -> Rule {
    Rule::OptionalObject {
        source: "Error",
        target: "Error",
        seed: error_seed(),
    }
}

/// Order entry acknowledgement.
pub static ORDER_ENTERED: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("NumOrder", "Assigned order number")),
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        Rule::Whole(Field::described("IdFi", "Financial instrument identifier")),
        error_rule(),
    ])
});

/// Order cancellation acknowledgement.
pub static ORDER_CANCELLED: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("NumOrder", "Cancelled order number")),
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        error_rule(),
    ])
});

/// Maximum order size for a prospective order.
pub static ORDER_LIMIT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::Whole(Field::described("IdAccount", "Account identifier")),
        Rule::Whole(Field::described("IdFi", "Financial instrument identifier")),
        Rule::Whole(Field::described("BuySell", "Direction: 1 buy, -1 sell")),
        Rule::Whole(Field::described("Quantity", "Maximum quantity")),
        Rule::Real(Field::described("Money", "Money available for the order")),
        error_rule(),
    ])
});

fn ack(schema: &'static Schema, root: &'static str) -> Pipeline {
    Pipeline::new()
        .extract_object(super::DATA)
        .map(schema)
        .wrap(root)
}

/// `{"order": {...}}`.
#[must_use]
pub fn order_entered() -> Pipeline {
    ack(&ORDER_ENTERED, "order")
}

/// `{"cancellation": {...}}`.
#[must_use]
pub fn order_cancelled() -> Pipeline {
    ack(&ORDER_CANCELLED, "cancellation")
}

/// `{"order_limit": {...}}`.
#[must_use]
pub fn order_limit() -> Pipeline {
    ack(&ORDER_LIMIT, "order_limit")
}
