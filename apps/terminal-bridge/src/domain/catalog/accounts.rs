//! Trading accounts.

use std::sync::LazyLock;

use crate::domain::entry::Pipeline;
use crate::domain::schema::{Field, Rule, Schema};

/// Message when the terminal reports no accounts.
pub const ACCOUNTS_MISSING: &str = "Accounts are missing";

/// Account record: id under either name, plus the IIA type code.
pub static ACCOUNT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new(vec![
        Rule::ChoiceWhole {
            primary: "IdAccount",
            secondary: "AccountId",
            target: "AccountId",
        },
        Rule::Whole(Field::bare("IIAType")),
    ])
});

/// `{"Data": [...]}` → `[{"AccountId", "IIAType"}, ...]`.
#[must_use]
pub fn accounts() -> Pipeline {
    Pipeline::new()
        .extract_array(super::DATA)
        .require_non_empty(ACCOUNTS_MISSING)
        .map(&ACCOUNT)
}
