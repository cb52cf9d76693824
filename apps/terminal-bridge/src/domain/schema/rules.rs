//! Field-level rules.
//!
//! A rule reads the fields it owns from one raw terminal object and writes
//! its output fields into the object being built. Rules never look at what
//! sibling rules wrote.

use serde_json::{Map, Value};

use super::{Schema, SchemaError};

/// Key holding the raw value in a described field.
pub const VALUE_KEY: &str = "value";

/// Key holding the static text in a described field.
pub const DESCRIPTION_KEY: &str = "description";

// =============================================================================
// Field
// =============================================================================

/// How a scalar lands in the output object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// The value itself.
    Bare,
    /// `{"value": ..., "description": "..."}`.
    Described(&'static str),
}

/// Source/target naming for a scalar rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    source: &'static str,
    target: &'static str,
    presentation: Presentation,
}

impl Field {
    /// Described field keeping its source name.
    #[must_use]
    pub const fn described(source: &'static str, description: &'static str) -> Self {
        Self {
            source,
            target: source,
            presentation: Presentation::Described(description),
        }
    }

    /// Described field written under a new name.
    #[must_use]
    pub const fn described_as(
        source: &'static str,
        target: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            source,
            target,
            presentation: Presentation::Described(description),
        }
    }

    /// Bare field keeping its source name.
    #[must_use]
    pub const fn bare(source: &'static str) -> Self {
        Self {
            source,
            target: source,
            presentation: Presentation::Bare,
        }
    }

    /// Bare field written under a new name.
    #[must_use]
    pub const fn bare_as(source: &'static str, target: &'static str) -> Self {
        Self {
            source,
            target,
            presentation: Presentation::Bare,
        }
    }

    fn write(&self, output: &mut Map<String, Value>, value: Value) {
        let value = match self.presentation {
            Presentation::Bare => value,
            Presentation::Described(description) => {
                let mut described = Map::with_capacity(2);
                described.insert(VALUE_KEY.to_string(), value);
                described.insert(
                    DESCRIPTION_KEY.to_string(),
                    Value::String(description.to_string()),
                );
                Value::Object(described)
            }
        };
        output.insert(self.target.to_string(), value);
    }
}

// =============================================================================
// Rule
// =============================================================================

/// One composable field-level transformation.
#[derive(Debug, Clone)]
pub enum Rule {
    /// 64-bit integer.
    Whole(Field),
    /// Floating point number.
    Real(Field),
    /// String; JSON `null` reads as the empty string.
    Text(Field),
    /// Boolean literal.
    Flag(Field),
    /// Array of nested objects. Absent, `null` or non-array input yields `[]`.
    Array {
        /// Input key.
        source: &'static str,
        /// Output key.
        target: &'static str,
        /// Schema applied to each element.
        schema: Schema,
    },
    /// Required nested object.
    Object {
        /// Input key.
        source: &'static str,
        /// Output key.
        target: &'static str,
        /// Schema applied to the nested object.
        schema: Schema,
    },
    /// Nested object that may be absent or `null`, merged over a seed.
    OptionalObject {
        /// Input key.
        source: &'static str,
        /// Output key.
        target: &'static str,
        /// Object used when the source is absent; present fields override it.
        seed: Map<String, Value>,
    },
    /// Integer under a primary key, falling back to a secondary key.
    ChoiceWhole {
        /// Preferred input key.
        primary: &'static str,
        /// Input key used when the primary is absent.
        secondary: &'static str,
        /// Output key.
        target: &'static str,
    },
    /// Equal-length parallel number arrays zipped into an array of objects.
    Zip {
        /// Output key.
        target: &'static str,
        /// `(input array key, output element key)` pairs.
        columns: &'static [(&'static str, &'static str)],
    },
}

impl Rule {
    /// Apply the rule, writing its fields into `output`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] naming the offending field.
    pub fn apply(
        &self,
        input: &Map<String, Value>,
        output: &mut Map<String, Value>,
    ) -> Result<(), SchemaError> {
        match self {
            Self::Whole(field) => {
                let value = read(input, field.source)?;
                let number = as_whole(value).ok_or_else(|| wrong(field.source, "integer"))?;
                field.write(output, Value::from(number));
            }
            Self::Real(field) => {
                let value = read(input, field.source)?;
                let number = value
                    .as_f64()
                    .ok_or_else(|| wrong(field.source, "number"))?;
                field.write(output, Value::from(number));
            }
            Self::Text(field) => {
                let text = match read(input, field.source)? {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    _ => return Err(wrong(field.source, "string")),
                };
                field.write(output, Value::String(text));
            }
            Self::Flag(field) => {
                let flag = read(input, field.source)?
                    .as_bool()
                    .ok_or_else(|| wrong(field.source, "boolean"))?;
                field.write(output, Value::Bool(flag));
            }
            Self::Array {
                source,
                target,
                schema,
            } => {
                let elements = match input.get(*source) {
                    Some(Value::Array(elements)) => elements
                        .iter()
                        .enumerate()
                        .map(|(index, element)| {
                            schema
                                .node(element)
                                .map_err(|e| e.within(&format!("{source}[{index}]")))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                output.insert((*target).to_string(), Value::Array(elements));
            }
            Self::Object {
                source,
                target,
                schema,
            } => {
                let nested = read(input, source)?;
                if !nested.is_object() {
                    return Err(wrong(source, "object"));
                }
                let node = schema.node(nested).map_err(|e| e.within(source))?;
                output.insert((*target).to_string(), node);
            }
            Self::OptionalObject {
                source,
                target,
                seed,
            } => {
                let mut merged = seed.clone();
                match input.get(*source) {
                    None | Some(Value::Null) => {}
                    Some(Value::Object(present)) => {
                        for (key, value) in present {
                            if !value.is_null() {
                                merged.insert(key.clone(), value.clone());
                            }
                        }
                    }
                    Some(_) => return Err(wrong(source, "object")),
                }
                output.insert((*target).to_string(), Value::Object(merged));
            }
            Self::ChoiceWhole {
                primary,
                secondary,
                target,
            } => {
                // The secondary name is read only when the primary is absent.
                let (field, value) = match input.get(*primary) {
                    Some(value) if !value.is_null() => (*primary, value),
                    _ => match input.get(*secondary) {
                        Some(value) if !value.is_null() => (*secondary, value),
                        _ => {
                            return Err(SchemaError::Missing {
                                field: (*primary).to_string(),
                            });
                        }
                    },
                };
                let number = as_whole(value).ok_or_else(|| wrong(field, "integer"))?;
                output.insert((*target).to_string(), Value::from(number));
            }
            Self::Zip { target, columns } => {
                output.insert((*target).to_string(), zip_columns(input, columns)?);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn read<'a>(input: &'a Map<String, Value>, field: &str) -> Result<&'a Value, SchemaError> {
    input.get(field).ok_or_else(|| SchemaError::Missing {
        field: field.to_string(),
    })
}

fn wrong(field: &str, expected: &'static str) -> SchemaError {
    SchemaError::WrongKind {
        field: field.to_string(),
        expected,
    }
}

/// Integer view of a JSON number, accepting integral floats.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn as_whole(value: &Value) -> Option<i64> {
    if let Some(number) = value.as_i64() {
        return Some(number);
    }
    let float = value.as_f64()?;
    (float.fract() == 0.0 && float.abs() < i64::MAX as f64).then_some(float as i64)
}

fn zip_columns(
    input: &Map<String, Value>,
    columns: &[(&'static str, &'static str)],
) -> Result<Value, SchemaError> {
    let mut arrays = Vec::with_capacity(columns.len());
    for (source, _) in columns {
        let array = read(input, source)?
            .as_array()
            .ok_or_else(|| wrong(source, "array"))?;
        arrays.push(array);
    }

    let Some(expected) = arrays.first().map(|array| array.len()) else {
        return Ok(Value::Array(Vec::new()));
    };
    for ((source, _), array) in columns.iter().zip(&arrays) {
        if array.len() != expected {
            return Err(SchemaError::LengthMismatch {
                field: (*source).to_string(),
                expected,
                actual: array.len(),
            });
        }
    }

    let mut rows = Vec::with_capacity(expected);
    for index in 0..expected {
        let mut row = Map::with_capacity(columns.len());
        for ((source, target), array) in columns.iter().zip(&arrays) {
            let cell = &array[index];
            if !cell.is_number() {
                return Err(wrong(&format!("{source}[{index}]"), "number"));
            }
            row.insert((*target).to_string(), cell.clone());
        }
        rows.push(Value::Object(row));
    }
    Ok(Value::Array(rows))
}
