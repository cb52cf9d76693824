//! Entry Pipeline
//!
//! Turns one unescaped terminal payload into the JSON handed back to the
//! caller. A [`Pipeline`] is an ordered list of stages: extract a field,
//! filter, require non-empty, map through a [`Schema`], wrap under a root
//! key. [`Fallback`] composes two sources and switches to the second only
//! when the first reports [`EntryError::Missing`].

mod filters;

pub use filters::{AccountFilter, AssetFilter, Filter, ScopeFilter, TickerFilter};

use std::fmt;

use serde_json::{Map, Value};

use super::schema::{Schema, SchemaError};

// =============================================================================
// Errors
// =============================================================================

/// Pipeline failure.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    /// Well-formed payload, but the requested subset is absent or empty.
    #[error("{0}")]
    Missing(String),

    /// A stage received a JSON kind it cannot work on.
    #[error("invalid entry: {0}")]
    Invalid(String),

    /// A schema rejected an element.
    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    /// Payload is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl EntryError {
    /// Whether this is the distinguished missing-data condition.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }
}

// =============================================================================
// Source
// =============================================================================

/// Anything that produces an entry from a parsed payload.
pub trait Source: Send + Sync {
    /// Produce the entry.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::Missing`] when the requested data is absent so
    /// that a [`Fallback`] can try elsewhere; other variants are fatal.
    fn produce(&self, payload: &Value) -> Result<Value, EntryError>;

    /// Parse a payload string and produce the entry.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::Json`] for unparseable input, otherwise as
    /// [`Source::produce`].
    fn run(&self, payload: &str) -> Result<Value, EntryError> {
        let parsed: Value = serde_json::from_str(payload)?;
        self.produce(&parsed)
    }
}

/// Tries `primary`, then `secondary` if the primary reports missing data.
#[derive(Debug, Clone)]
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
}

impl<P: Source, S: Source> Fallback<P, S> {
    /// Compose two sources.
    pub const fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: Source, S: Source> Source for Fallback<P, S> {
    fn produce(&self, payload: &Value) -> Result<Value, EntryError> {
        match self.primary.produce(payload) {
            Err(EntryError::Missing(reason)) => {
                tracing::debug!(reason = %reason, "Primary source missing, using fallback");
                self.secondary.produce(payload)
            }
            other => other,
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

enum Stage {
    ExtractArray(&'static str),
    ExtractObject(&'static str),
    Filter {
        filter: Box<dyn Filter>,
        missing: String,
    },
    RequireNonEmpty(String),
    Map(&'static Schema),
    Wrap(&'static str),
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtractArray(field) => write!(f, "ExtractArray({field})"),
            Self::ExtractObject(field) => write!(f, "ExtractObject({field})"),
            Self::Filter { missing, .. } => write!(f, "Filter({missing:?})"),
            Self::RequireNonEmpty(missing) => write!(f, "RequireNonEmpty({missing:?})"),
            Self::Map(schema) => write!(f, "Map({} rules)", schema.rules().len()),
            Self::Wrap(root) => write!(f, "Wrap({root})"),
        }
    }
}

/// Ordered stages applied to one payload.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Empty pipeline; passes the payload through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull an array field out of the payload object.
    #[must_use]
    pub fn extract_array(mut self, field: &'static str) -> Self {
        self.stages.push(Stage::ExtractArray(field));
        self
    }

    /// Pull an object field out of the payload object.
    #[must_use]
    pub fn extract_object(mut self, field: &'static str) -> Self {
        self.stages.push(Stage::ExtractObject(field));
        self
    }

    /// Keep matching elements; nothing left is reported as `missing`.
    #[must_use]
    pub fn filter(mut self, filter: impl Filter + 'static, missing: impl Into<String>) -> Self {
        self.stages.push(Stage::Filter {
            filter: Box::new(filter),
            missing: missing.into(),
        });
        self
    }

    /// Fail with `missing` when the current array is empty.
    #[must_use]
    pub fn require_non_empty(mut self, missing: impl Into<String>) -> Self {
        self.stages.push(Stage::RequireNonEmpty(missing.into()));
        self
    }

    /// Reshape every element (or the single object) through `schema`.
    #[must_use]
    pub fn map(mut self, schema: &'static Schema) -> Self {
        self.stages.push(Stage::Map(schema));
        self
    }

    /// Nest the result under `root`.
    #[must_use]
    pub fn wrap(mut self, root: &'static str) -> Self {
        self.stages.push(Stage::Wrap(root));
        self
    }

    fn step(stage: &Stage, entry: Value) -> Result<Value, EntryError> {
        match stage {
            Stage::ExtractArray(field) => match field_of(&entry, field)? {
                Value::Array(items) => Ok(Value::Array(items)),
                _ => Err(EntryError::Missing(format!("'{field}' is missing"))),
            },
            Stage::ExtractObject(field) => match field_of(&entry, field)? {
                Value::Object(object) => Ok(Value::Object(object)),
                _ => Err(EntryError::Missing(format!("'{field}' is missing"))),
            },
            Stage::Filter { filter, missing } => match entry {
                Value::Array(items) => {
                    let kept: Vec<Value> =
                        items.into_iter().filter(|item| filter.matches(item)).collect();
                    if kept.is_empty() {
                        Err(EntryError::Missing(missing.clone()))
                    } else {
                        Ok(Value::Array(kept))
                    }
                }
                Value::Object(_) if filter.matches(&entry) => Ok(entry),
                Value::Object(_) => Err(EntryError::Missing(missing.clone())),
                other => Err(invalid("filter", &other)),
            },
            Stage::RequireNonEmpty(missing) => match &entry {
                Value::Array(items) if items.is_empty() => {
                    Err(EntryError::Missing(missing.clone()))
                }
                Value::Object(object) if object.is_empty() => {
                    Err(EntryError::Missing(missing.clone()))
                }
                Value::Array(_) | Value::Object(_) => Ok(entry),
                other => Err(invalid("non-empty check", other)),
            },
            Stage::Map(schema) => match &entry {
                Value::Array(items) => Ok(Value::Array(schema.nodes(items)?)),
                Value::Object(_) => Ok(schema.node(&entry)?),
                other => Err(invalid("schema mapping", other)),
            },
            Stage::Wrap(root) => {
                let mut wrapped = Map::with_capacity(1);
                wrapped.insert((*root).to_string(), entry);
                Ok(Value::Object(wrapped))
            }
        }
    }
}

impl Source for Pipeline {
    fn produce(&self, payload: &Value) -> Result<Value, EntryError> {
        self.stages
            .iter()
            .try_fold(payload.clone(), |entry, stage| Self::step(stage, entry))
    }
}

fn field_of(entry: &Value, field: &str) -> Result<Value, EntryError> {
    let object = entry
        .as_object()
        .ok_or_else(|| invalid(&format!("extracting '{field}'"), entry))?;
    object
        .get(field)
        .cloned()
        .ok_or_else(|| EntryError::Missing(format!("'{field}' is missing")))
}

fn invalid(stage: &str, entry: &Value) -> EntryError {
    let kind = match entry {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    EntryError::Invalid(format!("{stage} cannot apply to a {kind}"))
}
