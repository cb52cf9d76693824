//! Declarative Reshaping Schemas
//!
//! A [`Schema`] is an ordered list of [`Rule`]s applied to one raw terminal
//! object. Output keys follow rule order. Application is fail-fast: the first
//! rule that cannot read its field aborts the whole node.

mod rules;

pub use rules::{DESCRIPTION_KEY, Field, Presentation, Rule, VALUE_KEY};

use serde_json::{Map, Value};

/// Why a raw object could not be reshaped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Input node is not a JSON object.
    #[error("expected a JSON object at {path}")]
    NotAnObject {
        /// Where the non-object was found (`$` for the root).
        path: String,
    },

    /// Required field is absent.
    #[error("missing required field '{field}'")]
    Missing {
        /// Field path.
        field: String,
    },

    /// Field holds the wrong JSON kind.
    #[error("field '{field}' is not a valid {expected}")]
    WrongKind {
        /// Field path.
        field: String,
        /// Expected kind.
        expected: &'static str,
    },

    /// Parallel arrays disagree in length.
    #[error("array '{field}' has {actual} elements, expected {expected}")]
    LengthMismatch {
        /// Field path.
        field: String,
        /// Length of the first column.
        expected: usize,
        /// Length of this column.
        actual: usize,
    },
}

impl SchemaError {
    /// Prefix the error's field path with an enclosing path.
    #[must_use]
    pub fn within(self, prefix: &str) -> Self {
        let join = |inner: String| {
            if inner == "$" {
                prefix.to_string()
            } else {
                format!("{prefix}.{inner}")
            }
        };
        match self {
            Self::NotAnObject { path } => Self::NotAnObject { path: join(path) },
            Self::Missing { field } => Self::Missing { field: join(field) },
            Self::WrongKind { field, expected } => Self::WrongKind {
                field: join(field),
                expected,
            },
            Self::LengthMismatch {
                field,
                expected,
                actual,
            } => Self::LengthMismatch {
                field: join(field),
                expected,
                actual,
            },
        }
    }

    /// Field path the error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::NotAnObject { path } => path,
            Self::Missing { field }
            | Self::WrongKind { field, .. }
            | Self::LengthMismatch { field, .. } => field,
        }
    }
}

/// Ordered list of rules producing one output object.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    rules: Vec<Rule>,
}

impl Schema {
    /// Create a schema from rules in output order.
    #[must_use]
    pub const fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Rules in application order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Reshape one raw node.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotAnObject`] when `input` is not an object,
    /// otherwise the first rule failure.
    pub fn node(&self, input: &Value) -> Result<Value, SchemaError> {
        let object = input.as_object().ok_or_else(|| SchemaError::NotAnObject {
            path: "$".to_string(),
        })?;
        self.node_object(object).map(Value::Object)
    }

    /// Reshape one raw object.
    ///
    /// # Errors
    ///
    /// Returns the first rule failure.
    pub fn node_object(&self, input: &Map<String, Value>) -> Result<Map<String, Value>, SchemaError> {
        let mut output = Map::with_capacity(self.rules.len());
        for rule in &self.rules {
            rule.apply(input, &mut output)?;
        }
        Ok(output)
    }

    /// Reshape every element of an array, aborting on the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first element failure, its path prefixed with `[index]`.
    pub fn nodes(&self, inputs: &[Value]) -> Result<Vec<Value>, SchemaError> {
        inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                self.node(input)
                    .map_err(|e| e.within(&format!("[{index}]")))
            })
            .collect()
    }
}
